//! Error types for the codeagent client.
//!
//! Transport failures, stream handshake failures, store invariant violations and
//! persistence failures all share one error type.  Only `RequestFailed` and
//! `StreamUnavailable` are expected to reach a turn boundary, where they become the
//! content of the in-progress message.

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// The main error type for codeagent.
#[derive(Clone, Debug)]
pub enum Error {
    /// The service answered with a non-2xx status.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// The response body text.
        message: String,
    },

    /// A single attempt ran past its deadline and was aborted.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// Connection error.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// HTTP client error.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Every attempt of a one-shot request failed.
    RequestFailed {
        /// Number of attempts made.
        attempts: u32,
        /// The cause observed on the last attempt.
        source: Box<Error>,
    },

    /// The streaming handshake did not produce a readable, successful response.
    StreamUnavailable {
        /// Human-readable error message.
        message: String,
        /// HTTP status code, when the server answered at all.
        status_code: Option<u16>,
    },

    /// The transport failed after the stream was established.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A fragment or close was applied with no open message.
    NoOpenMessage,

    /// A message is already open; a new turn cannot begin until it closes.
    TurnInProgress,

    /// Writing or reading the persisted snapshot failed.
    PersistenceFailure {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Error during JSON serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// Error during validation of parameters or settings.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// Creates a new API error from a status code and response body.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Wraps the last observed cause after all attempts were spent.
    pub fn request_failed(attempts: u32, cause: Error) -> Self {
        Error::RequestFailed {
            attempts,
            source: Box::new(cause),
        }
    }

    /// Creates a new stream-unavailable error.
    pub fn stream_unavailable(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Error::StreamUnavailable {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new persistence error.
    pub fn persistence(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::PersistenceFailure {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// Returns true if one-shot requests exhausted their attempts.
    pub fn is_request_failed(&self) -> bool {
        matches!(self, Error::RequestFailed { .. })
    }

    /// Returns true if the streaming handshake failed.
    pub fn is_stream_unavailable(&self) -> bool {
        matches!(self, Error::StreamUnavailable { .. })
    }

    /// Returns true if a fragment arrived with no open message.
    pub fn is_no_open_message(&self) -> bool {
        matches!(self, Error::NoOpenMessage)
    }

    /// Returns true if a turn was started while another was open.
    pub fn is_turn_in_progress(&self) -> bool {
        matches!(self, Error::TurnInProgress)
    }

    /// Returns true if this error is a persistence failure.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::PersistenceFailure { .. })
    }

    /// Returns true if this error is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns true if a one-shot attempt that failed this way should be tried again.
    ///
    /// Any failure on the wire counts, including non-2xx responses and bodies that do
    /// not parse.  Local failures such as an unserializable request do not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Api { .. }
                | Error::Timeout { .. }
                | Error::Connection { .. }
                | Error::HttpClient { .. }
                | Error::Serialization { .. }
        )
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            Error::StreamUnavailable { status_code, .. } => *status_code,
            Error::RequestFailed { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Returns the cause observed on the final attempt of a failed request.
    pub fn last_cause(&self) -> Option<&Error> {
        match self {
            Error::RequestFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The text a failed turn shows after `"Error: "`.
    ///
    /// For a non-2xx response this is the body text alone, and for a failed handshake it
    /// is the handshake message.  Attempt counts and status codes stay in `Display`,
    /// which is what the logs use.
    pub fn detail(&self) -> String {
        match self {
            Error::RequestFailed { source, .. } => source.detail(),
            Error::Api {
                status_code,
                message,
            } => {
                if message.trim().is_empty() {
                    format!("HTTP {status_code}")
                } else {
                    message.clone()
                }
            }
            Error::Timeout { message, .. }
            | Error::Connection { message, .. }
            | Error::HttpClient { message, .. }
            | Error::StreamUnavailable { message, .. }
            | Error::Streaming { message, .. } => message.clone(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api {
                status_code,
                message,
            } => {
                if message.is_empty() {
                    write!(f, "HTTP {status_code}")
                } else {
                    write!(f, "HTTP {status_code}: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::RequestFailed { attempts, source } => {
                if *attempts == 1 {
                    write!(f, "{source}")
                } else {
                    write!(f, "{source} (after {attempts} attempts)")
                }
            }
            Error::StreamUnavailable {
                message,
                status_code,
            } => {
                if let Some(status_code) = status_code {
                    write!(f, "Stream unavailable: {message} (HTTP {status_code})")
                } else {
                    write!(f, "Stream unavailable: {message}")
                }
            }
            Error::Streaming { message, .. } => {
                write!(f, "Streaming error: {message}")
            }
            Error::NoOpenMessage => {
                write!(f, "No open message to update")
            }
            Error::TurnInProgress => {
                write!(f, "A response is still in progress")
            }
            Error::PersistenceFailure { message, .. } => {
                write!(f, "Persistence error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} (parameter: {param})")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. }
            | Error::PersistenceFailure { source, .. }
            | Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::RequestFailed { source, .. } => Some(source.as_ref()),
            Error::Io { source, .. } => Some(source),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

/// A specialized Result type for codeagent operations.
pub type Result<T> = std::result::Result<T, Error>;
