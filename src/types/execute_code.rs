use serde::{Deserialize, Serialize};

/// Languages the execution service accepts.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python 3.
    #[default]
    Python,
}

/// Request body for the code-execution endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteCodeParams {
    /// Source code to execute.
    pub code: String,

    /// Language of `code`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,

    /// Wall-clock limit for the sandboxed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,

    /// Memory limit for the sandboxed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,

    /// CPU quota for the sandboxed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u32>,
}

impl ExecuteCodeParams {
    /// Create params carrying only code.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Set the language.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Set the wall-clock limit.
    pub fn with_timeout_seconds(mut self, timeout_seconds: u32) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Set the memory limit.
    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Set the CPU quota.
    pub fn with_cpu_millis(mut self, cpu_millis: u32) -> Self {
        self.cpu_millis = Some(cpu_millis);
        self
    }
}

/// Response body of the one-shot code-execution endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteCodeResponse {
    /// Combined stdout and stderr of the run.
    pub logs: String,

    /// Process exit status.
    pub exit_code: i32,

    /// How long the run took, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ExecuteCodeResponse {
    /// Render the run the way the output pane shows it: the logs, a newline, then the
    /// exit code.
    pub fn display(&self) -> String {
        format!("{}\nExit code: {}", self.logs, self.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_appends_exit_code() {
        let response: ExecuteCodeResponse =
            serde_json::from_value(json!({"logs": "hi\n", "exit_code": 0})).unwrap();
        assert_eq!(response.duration_ms, None);
        assert_eq!(response.display(), "hi\n\nExit code: 0");
    }

    #[test]
    fn display_without_trailing_newline() {
        let response: ExecuteCodeResponse =
            serde_json::from_value(json!({"logs": "hi", "exit_code": 1})).unwrap();
        assert_eq!(response.display(), "hi\nExit code: 1");
    }

    #[test]
    fn limits_are_omitted_unless_set() {
        let params = ExecuteCodeParams::new("print(1)");
        assert_eq!(serde_json::to_value(&params).unwrap(), json!({"code": "print(1)"}));

        let params = params.with_language(Language::Python).with_timeout_seconds(10);
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"code": "print(1)", "language": "python", "timeout_seconds": 10})
        );
    }
}
