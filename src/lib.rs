// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod persistence;
pub mod render;
pub mod retry;
pub mod store;
pub mod stream;
pub mod types;
pub mod workbench;

// Re-exports
pub use client::Client;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use persistence::{FileStorage, MemoryStorage, Persistence, STATE_KEY, Storage};
pub use render::{NullRenderer, PlainTextRenderer, Renderer, StreamContext, TurnKind};
pub use retry::{RequestOptions, retry_with_backoff};
pub use store::{
    AppState, Conversation, OutputBuffer, SharedStore, Store, StoreListener, SubscriptionId,
    TurnId,
};
pub use stream::{FragmentStream, Utf8Decoder};
pub use types::*;
pub use workbench::Workbench;
