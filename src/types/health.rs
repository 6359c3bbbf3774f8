use serde::{Deserialize, Serialize};

/// Response body of a service's root endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Greeting returned by the service.
    pub message: String,
}
