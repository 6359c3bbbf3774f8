//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which wires the persisted state,
//! the store, and the workbench together and exposes the operations the REPL needs.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::chat::commands::Service;
use crate::chat::config::ChatConfig;
use crate::client::Client;
use crate::error::Result;
use crate::persistence::{FileStorage, Persistence, Storage};
use crate::render::Renderer;
use crate::store::{Store, lock};
use crate::types::{Message, Settings, Theme};
use crate::workbench::Workbench;

/// A chat session over a persisted store.
///
/// Every mutation the session makes (prompts, settings edits, clears) is mirrored to
/// storage before the call returns.
pub struct ChatSession {
    workbench: Workbench,
    streaming: bool,
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The current settings.
    pub settings: Settings,
    /// The number of messages in the conversation.
    pub message_count: usize,
    /// Whether a chat turn is in flight.
    pub chat_open: bool,
    /// Whether an execution turn is in flight.
    pub output_open: bool,
    /// Whether turns use the streaming endpoints.
    pub streaming: bool,
    /// Retries for one-shot requests.
    pub retries: u32,
    /// Per-attempt deadline for one-shot requests.
    pub timeout: Duration,
}

impl ChatSession {
    /// Creates a session around an existing workbench.
    pub fn new(workbench: Workbench, streaming: bool) -> Self {
        Self {
            workbench,
            streaming,
        }
    }

    /// Opens a session backed by the state directory named in `config`.
    pub fn open(config: &ChatConfig) -> Result<Self> {
        let storage = FileStorage::new(config.state_dir.clone());
        Self::with_storage(config, storage)
    }

    /// Opens a session backed by `storage`.
    ///
    /// The stored snapshot wins over environment defaults, and the overrides in
    /// `config` win over both.  Overrides are persisted like any other edit.
    pub fn with_storage<S: Storage + 'static>(config: &ChatConfig, storage: S) -> Result<Self> {
        let persistence = Persistence::new(storage);
        let snapshot = persistence.load();
        if snapshot.is_some() {
            tracing::info!(key = persistence.key(), "restored persisted state");
        }
        let mut store = Store::from_snapshot(snapshot, Settings::from_env());
        store.subscribe(persistence);
        if config.model_base.is_some() || config.exec_base.is_some() {
            let settings = config.apply_overrides(store.settings().clone());
            store.update_settings(settings)?;
        }

        let client = Client::with_options(config.request)?;
        let workbench = Workbench::new(client, store.into_shared())
            .with_generation_defaults(config.generation.clone())
            .with_execution_defaults(config.execution.clone());
        Ok(Self::new(workbench, config.streaming))
    }

    /// The underlying workbench.
    pub fn workbench(&self) -> &Workbench {
        &self.workbench
    }

    /// Sends a prompt, streaming or one-shot depending on the session mode.
    pub async fn send(
        &self,
        prompt: &str,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.streaming {
            self.workbench.send_streaming(prompt, renderer, cancel).await
        } else {
            self.workbench.send(prompt, renderer).await
        }
    }

    /// Executes code, streaming or one-shot depending on the session mode.
    pub async fn run(
        &self,
        code: &str,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.streaming {
            self.workbench.run_streaming(code, renderer, cancel).await
        } else {
            self.workbench.run(code, renderer).await
        }
    }

    /// Asks `service` for its greeting.
    pub async fn health(&self, service: Service) -> Result<String> {
        let settings = self.settings();
        let base = match service {
            Service::Model => settings.model_base,
            Service::Exec => settings.exec_base,
        };
        let response = self.workbench.client().health(&base).await?;
        Ok(response.message)
    }

    /// Clears the conversation history.
    pub fn clear(&self) {
        lock(self.workbench.store()).clear();
    }

    /// Clears the execution output.
    pub fn clear_output(&self) {
        lock(self.workbench.store()).clear_output();
    }

    /// Changes the code-generation base URL.
    pub fn set_model_base(&self, url: &str) -> Result<()> {
        lock(self.workbench.store()).set_model_base(url)
    }

    /// Changes the code-execution base URL.
    pub fn set_exec_base(&self, url: &str) -> Result<()> {
        lock(self.workbench.store()).set_exec_base(url)
    }

    /// Changes the theme.
    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        lock(self.workbench.store()).set_theme(theme)
    }

    /// Switches between streaming and one-shot endpoints.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }

    /// Returns true if turns use the streaming endpoints.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> Settings {
        self.workbench.settings()
    }

    /// A copy of the conversation.
    pub fn messages(&self) -> Vec<Message> {
        lock(self.workbench.store()).conversation().messages().to_vec()
    }

    /// Returns the number of messages in the conversation.
    pub fn message_count(&self) -> usize {
        lock(self.workbench.store()).conversation().len()
    }

    /// A copy of the execution output.
    pub fn output(&self) -> String {
        lock(self.workbench.store()).output().content().to_string()
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let store = lock(self.workbench.store());
        let options = self.workbench.client().options();
        SessionStats {
            settings: store.settings().clone(),
            message_count: store.conversation().len(),
            chat_open: store.conversation().is_open(),
            output_open: store.output().is_open(),
            streaming: self.streaming,
            retries: options.retries,
            timeout: options.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryStorage, STATE_KEY};
    use crate::types::PersistedSnapshot;

    fn seeded(messages: Vec<Message>) -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        let snapshot = PersistedSnapshot::new(
            Settings::new("http://models:8000", "http://sandbox:5000", Theme::Light),
            messages,
        );
        storage
            .set(STATE_KEY, &serde_json::to_string(&snapshot).unwrap())
            .unwrap();
        storage
    }

    fn stored(storage: &MemoryStorage) -> PersistedSnapshot {
        let raw = storage.get(STATE_KEY).unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn new_session_restores_snapshot() {
        let storage = seeded(vec![Message::user("p"), Message::assistant("code")]);
        let session = ChatSession::with_storage(&ChatConfig::new(), storage).unwrap();

        assert_eq!(session.message_count(), 2);
        assert_eq!(session.settings().model_base, "http://models:8000");
        assert_eq!(session.settings().theme, Theme::Light);
        assert!(session.is_streaming());
    }

    #[test]
    fn overrides_win_and_are_persisted() {
        let storage = seeded(Vec::new());
        let config = ChatConfig::new().with_model_base("http://gpu:9000");
        let session = ChatSession::with_storage(&config, storage.clone()).unwrap();

        assert_eq!(session.settings().model_base, "http://gpu:9000");
        assert_eq!(session.settings().exec_base, "http://sandbox:5000");
        assert_eq!(stored(&storage).settings.model_base, "http://gpu:9000");
    }

    #[test]
    fn invalid_override_fails_to_open() {
        let config = ChatConfig::new().with_exec_base("not a url");
        assert!(ChatSession::with_storage(&config, MemoryStorage::new()).is_err());
    }

    #[test]
    fn clear_session_is_persisted() {
        let storage = seeded(vec![Message::user("p"), Message::assistant("code")]);
        let session = ChatSession::with_storage(&ChatConfig::new(), storage.clone()).unwrap();

        session.clear();
        assert_eq!(session.message_count(), 0);
        assert!(stored(&storage).messages.is_empty());
    }

    #[test]
    fn settings_edits_validate_and_persist() {
        let storage = MemoryStorage::new();
        let session = ChatSession::with_storage(&ChatConfig::new(), storage.clone()).unwrap();

        assert!(session.set_model_base("ftp://models").is_err());
        assert!(storage.is_empty());

        session.set_exec_base("http://sandbox:5001").unwrap();
        session.set_theme(Theme::Light).unwrap();
        let snapshot = stored(&storage);
        assert_eq!(snapshot.settings.exec_base, "http://sandbox:5001");
        assert_eq!(snapshot.settings.theme, Theme::Light);
    }

    #[test]
    fn stream_toggle() {
        let config = ChatConfig::new().without_streaming();
        let mut session = ChatSession::with_storage(&config, MemoryStorage::new()).unwrap();
        assert!(!session.is_streaming());
        session.set_streaming(true);
        assert!(session.stats().streaming);
    }
}
