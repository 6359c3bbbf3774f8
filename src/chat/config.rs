//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::retry::RequestOptions;
use crate::types::{ExecuteCodeParams, GenerateCodeParams, Settings};

/// Environment variable naming the state directory.
pub const STATE_DIR_ENV: &str = "CODEAGENT_STATE_DIR";

/// State directory used when neither the flag nor the environment names one.
pub const DEFAULT_STATE_DIR: &str = ".codeagent";

/// Command-line arguments for the codeagent-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the code-generation service.
    #[arrrg(optional, "Code-generation service URL (default: from settings)", "URL")]
    pub model_base: Option<String>,

    /// Base URL of the code-execution service.
    #[arrrg(optional, "Code-execution service URL (default: from settings)", "URL")]
    pub exec_base: Option<String>,

    /// Directory holding the persisted state.
    #[arrrg(optional, "Directory for persisted state (default: .codeagent)", "DIR")]
    pub state_dir: Option<String>,

    /// Retries for one-shot requests.
    #[arrrg(optional, "Retries for one-shot requests (default: 1)", "N")]
    pub retries: Option<u32>,

    /// Per-attempt deadline for one-shot requests.
    #[arrrg(optional, "Per-attempt timeout in milliseconds (default: 30000)", "MS")]
    pub timeout_ms: Option<u32>,

    /// Token limit sent with each prompt.
    #[arrrg(optional, "Max new tokens per generation (default: service)", "TOKENS")]
    pub max_new_tokens: Option<u32>,

    /// System prompt sent with each prompt.
    #[arrrg(optional, "System prompt for generation (default: service)", "PROMPT")]
    pub system: Option<String>,

    /// Wall-clock limit sent with each run.
    #[arrrg(optional, "Execution time limit in seconds (default: service)", "SECONDS")]
    pub exec_timeout_seconds: Option<u32>,

    /// Memory limit sent with each run.
    #[arrrg(optional, "Execution memory limit in MB (default: service)", "MB")]
    pub exec_memory_mb: Option<u32>,

    /// CPU quota sent with each run.
    #[arrrg(optional, "Execution CPU quota in millicores (default: service)", "MILLIS")]
    pub exec_cpu_millis: Option<u32>,

    /// Use the one-shot endpoints instead of streaming.
    #[arrrg(flag, "Use one-shot endpoints instead of streaming")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// Base URLs given here override whatever was persisted; unset ones leave the
/// persisted (or environment-default) settings alone.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Override for the code-generation base URL.
    pub model_base: Option<String>,

    /// Override for the code-execution base URL.
    pub exec_base: Option<String>,

    /// Directory holding the persisted snapshot.
    pub state_dir: PathBuf,

    /// Retry and timeout settings for one-shot requests.
    pub request: RequestOptions,

    /// Generation fields sent with every prompt.
    pub generation: GenerateCodeParams,

    /// Execution limits sent with every run.
    pub execution: ExecuteCodeParams,

    /// Whether turns use the streaming endpoints.
    pub streaming: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - No base URL overrides
    /// - State directory: `$CODEAGENT_STATE_DIR` or `.codeagent`
    /// - 1 retry, 30 second timeout
    /// - Streaming: enabled
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            model_base: None,
            exec_base: None,
            state_dir: default_state_dir(),
            request: RequestOptions::default(),
            generation: GenerateCodeParams::default(),
            execution: ExecuteCodeParams::default(),
            streaming: true,
            use_color: true,
        }
    }

    /// Overrides the code-generation base URL.
    pub fn with_model_base(mut self, url: impl Into<String>) -> Self {
        self.model_base = Some(url.into());
        self
    }

    /// Overrides the code-execution base URL.
    pub fn with_exec_base(mut self, url: impl Into<String>) -> Self {
        self.exec_base = Some(url.into());
        self
    }

    /// Sets the state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Sets the retry and timeout settings.
    pub fn with_request_options(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    /// Sets the generation fields.
    pub fn with_generation(mut self, generation: GenerateCodeParams) -> Self {
        self.generation = generation;
        self
    }

    /// Sets the execution limits.
    pub fn with_execution(mut self, execution: ExecuteCodeParams) -> Self {
        self.execution = execution;
        self
    }

    /// Switches to the one-shot endpoints.
    pub fn without_streaming(mut self) -> Self {
        self.streaming = false;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Applies the base URL overrides to `settings`.
    pub fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(model_base) = &self.model_base {
            settings.model_base = model_base.clone();
        }
        if let Some(exec_base) = &self.exec_base {
            settings.exec_base = exec_base.clone();
        }
        settings
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        let mut request = defaults.request;
        if let Some(retries) = args.retries {
            request.retries = retries;
        }
        if let Some(timeout_ms) = args.timeout_ms.filter(|ms| *ms > 0) {
            request.timeout = Duration::from_millis(u64::from(timeout_ms));
        }
        let generation = GenerateCodeParams {
            max_new_tokens: args.max_new_tokens,
            system_prompt: args.system,
            ..GenerateCodeParams::default()
        };
        let execution = ExecuteCodeParams {
            timeout_seconds: args.exec_timeout_seconds,
            memory_mb: args.exec_memory_mb,
            cpu_millis: args.exec_cpu_millis,
            ..ExecuteCodeParams::default()
        };
        ChatConfig {
            model_base: args.model_base,
            exec_base: args.exec_base,
            state_dir: args.state_dir.map(PathBuf::from).unwrap_or(defaults.state_dir),
            request,
            generation,
            execution,
            streaming: !args.no_stream,
            use_color: !args.no_color,
        }
    }
}

fn default_state_dir() -> PathBuf {
    env::var(STATE_DIR_ENV)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Theme;

    #[test]
    fn default_config() {
        let config = ChatConfig::new();
        assert!(config.model_base.is_none());
        assert!(config.exec_base.is_none());
        assert_eq!(config.request, RequestOptions::default());
        assert_eq!(config.generation, GenerateCodeParams::default());
        assert_eq!(config.execution, ExecuteCodeParams::default());
        assert!(config.streaming);
        assert!(config.use_color);
    }

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            model_base: Some("http://gpu:8000".to_string()),
            exec_base: None,
            state_dir: Some("/tmp/agent-state".to_string()),
            retries: Some(3),
            timeout_ms: Some(1500),
            max_new_tokens: Some(400),
            system: Some("Reply with code only.".to_string()),
            exec_timeout_seconds: Some(10),
            exec_memory_mb: Some(256),
            exec_cpu_millis: None,
            no_stream: true,
            no_color: true,
        };
        let config = ChatConfig::from(args);
        assert_eq!(config.model_base.as_deref(), Some("http://gpu:8000"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/agent-state"));
        assert_eq!(config.request.retries, 3);
        assert_eq!(config.request.timeout, Duration::from_millis(1500));
        assert_eq!(config.generation.max_new_tokens, Some(400));
        assert_eq!(
            config.generation.system_prompt.as_deref(),
            Some("Reply with code only.")
        );
        assert_eq!(
            config.execution,
            ExecuteCodeParams::default()
                .with_timeout_seconds(10)
                .with_memory_mb(256)
        );
        assert!(!config.streaming);
        assert!(!config.use_color);
    }

    #[test]
    fn zero_timeout_keeps_default() {
        let args = ChatArgs {
            timeout_ms: Some(0),
            ..ChatArgs::default()
        };
        assert_eq!(
            ChatConfig::from(args).request.timeout,
            RequestOptions::default().timeout
        );
    }

    #[test]
    fn overrides_replace_only_given_urls() {
        let config = ChatConfig::new().with_exec_base("http://sandbox:5000");
        let settings = config.apply_overrides(Settings::new(
            "http://models:8000",
            "http://old:5000",
            Theme::Light,
        ));
        assert_eq!(settings.model_base, "http://models:8000");
        assert_eq!(settings.exec_base, "http://sandbox:5000");
        assert_eq!(settings.theme, Theme::Light);
    }
}
