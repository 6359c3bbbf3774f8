// Public modules
pub mod endpoint;
pub mod execute_code;
pub mod generate_code;
pub mod health;
pub mod message;
pub mod settings;
pub mod snapshot;

// Re-exports
pub use endpoint::Endpoint;
pub use execute_code::{ExecuteCodeParams, ExecuteCodeResponse, Language};
pub use generate_code::{GenerateCodeParams, GenerateCodeResponse};
pub use health::HealthResponse;
pub use message::{Message, Role, RoleParseError};
pub use settings::{
    DEFAULT_EXEC_BASE, DEFAULT_MODEL_BASE, EXEC_BASE_ENV, MODEL_BASE_ENV, Settings, THEME_ENV,
    Theme, validate_base_url,
};
pub use snapshot::PersistedSnapshot;
