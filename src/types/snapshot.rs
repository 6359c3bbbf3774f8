use serde::{Deserialize, Serialize};

use crate::types::{Message, Settings};

/// The projection of application state written to storage after every mutation.
///
/// There is no version field; a snapshot that does not match this shape is discarded
/// on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedSnapshot {
    /// Settings at the time of the write.
    pub settings: Settings,

    /// The conversation at the time of the write.
    pub messages: Vec<Message>,
}

impl PersistedSnapshot {
    /// Create a new snapshot.
    pub fn new(settings: Settings, messages: Vec<Message>) -> Self {
        Self { settings, messages }
    }
}
