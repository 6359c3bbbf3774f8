use std::fmt;

use crate::error::Result;
use crate::types::settings::validate_base_url;

/// The routes exposed by the two backend services.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `GET /` on either service.
    Health,

    /// One-shot generation on the model service.
    GenerateCode,

    /// Streaming generation on the model service.
    GenerateCodeStream,

    /// One-shot execution on the execution service.
    ExecuteCode,

    /// Streaming execution on the execution service.
    ExecuteCodeStream,
}

impl Endpoint {
    /// The path of this endpoint relative to its service's base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Health => "/",
            Endpoint::GenerateCode => "/generate_code/",
            Endpoint::GenerateCodeStream => "/generate_code_stream",
            Endpoint::ExecuteCode => "/execute_code/",
            Endpoint::ExecuteCodeStream => "/execute_code_stream/",
        }
    }

    /// Join this endpoint onto `base`.
    ///
    /// A trailing slash on `base` is ignored so `http://host/` and `http://host` resolve
    /// to the same URL.
    pub fn url(&self, base: &str) -> Result<String> {
        let base = base.trim();
        validate_base_url(base)?;
        Ok(format!("{}{}", base.trim_end_matches('/'), self.path()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slash() {
        assert_eq!(
            Endpoint::GenerateCode.url("http://localhost:8000/").unwrap(),
            "http://localhost:8000/generate_code/"
        );
        assert_eq!(
            Endpoint::GenerateCodeStream.url("http://localhost:8000").unwrap(),
            "http://localhost:8000/generate_code_stream"
        );
        assert_eq!(
            Endpoint::ExecuteCodeStream.url("http://exec:5000/api").unwrap(),
            "http://exec:5000/api/execute_code_stream/"
        );
        assert_eq!(
            Endpoint::Health.url("http://exec:5000").unwrap(),
            "http://exec:5000/"
        );
    }

    #[test]
    fn relative_base_is_rejected() {
        assert!(Endpoint::ExecuteCode.url("exec:5000").is_err());
    }
}
