//! Application state and the mutations the UI layer drives.
//!
//! The [`Store`] owns three slices: [`Settings`], the chat [`Conversation`], and the
//! execution [`OutputBuffer`].  Every successful mutation notifies each subscribed
//! [`StoreListener`] with the new state.  Persistence is one such listener; the store
//! itself knows nothing about storage.
//!
//! A conversation grows by appending at the tail.  The only message whose content can
//! change is the most recent assistant message while it is *open*, i.e. while a turn
//! is feeding it fragments.  At most one message is open at a time.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::observability::STORE_MUTATIONS;
use crate::types::{Message, PersistedSnapshot, Role, Settings, Theme, validate_base_url};

/// Prefix placed in front of the detail of a failed turn.
pub const ERROR_PREFIX: &str = "Error: ";

/// Formats a failure the way it appears in the in-progress message.
pub fn error_content(detail: impl fmt::Display) -> String {
    format!("{ERROR_PREFIX}{detail}")
}

/////////////////////////////////////////// Conversation ///////////////////////////////////////////

/// Identifies the turn that opened a message or the output buffer.
///
/// Fragments and closes must name the turn they belong to.  Once the slot is cleared or
/// reopened by a later turn, an older id no longer matches and its updates fail with
/// [`Error::NoOpenMessage`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TurnId(u64);

/// An ordered list of messages with at most one open assistant message at the tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
    open: Option<TurnId>,
    next_turn: u64,
}

impl Conversation {
    /// Creates an empty conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a conversation from closed messages, e.g. ones rehydrated from storage.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// The messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns true while an assistant message is receiving fragments.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The open assistant message, if any.
    pub fn open_message(&self) -> Option<&Message> {
        self.open.and_then(|_| self.messages.last())
    }

    /// Appends a closed message.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        if self.is_open() {
            return Err(Error::TurnInProgress);
        }
        self.messages.push(Message::new(role, content));
        Ok(())
    }

    /// Appends an empty assistant message and marks it open.
    pub fn append_open_assistant(&mut self) -> Result<TurnId> {
        if self.is_open() {
            return Err(Error::TurnInProgress);
        }
        self.messages.push(Message::assistant(String::new()));
        Ok(self.open_turn())
    }

    /// Appends the user's prompt and an open assistant message as a pair.
    pub fn begin_turn(&mut self, prompt: impl Into<String>) -> Result<TurnId> {
        if self.is_open() {
            return Err(Error::TurnInProgress);
        }
        self.messages.push(Message::user(prompt));
        self.messages.push(Message::assistant(String::new()));
        Ok(self.open_turn())
    }

    /// Concatenates `fragment` onto the message `turn` opened.
    pub fn extend_open(&mut self, turn: TurnId, fragment: &str) -> Result<()> {
        let message = self.open_message_mut(turn)?;
        message.content.push_str(fragment);
        Ok(())
    }

    /// Closes the message `turn` opened, optionally replacing its content first.
    pub fn close_open(&mut self, turn: TurnId, final_content: Option<String>) -> Result<()> {
        let message = self.open_message_mut(turn)?;
        if let Some(content) = final_content {
            message.content = content;
        }
        self.open = None;
        Ok(())
    }

    /// Replaces the message `turn` opened with an error line and closes it.
    pub fn fail_open(&mut self, turn: TurnId, detail: impl fmt::Display) -> Result<()> {
        self.close_open(turn, Some(error_content(detail)))
    }

    /// Removes every message, abandoning any open turn.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.open = None;
    }

    fn open_turn(&mut self) -> TurnId {
        let turn = TurnId(self.next_turn);
        self.next_turn += 1;
        self.open = Some(turn);
        turn
    }

    fn open_message_mut(&mut self, turn: TurnId) -> Result<&mut Message> {
        if self.open != Some(turn) {
            return Err(Error::NoOpenMessage);
        }
        self.messages.last_mut().ok_or(Error::NoOpenMessage)
    }
}

/////////////////////////////////////////// OutputBuffer ///////////////////////////////////////////

/// The single text buffer the execution pane shows.
///
/// It follows the same open/extend/close discipline as a conversation's open message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    content: String,
    open: Option<TurnId>,
    next_turn: u64,
}

impl OutputBuffer {
    /// Creates an empty, closed buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns true while a run is feeding the buffer.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Empties the buffer and opens it for a new run.
    pub fn begin(&mut self) -> Result<TurnId> {
        if self.is_open() {
            return Err(Error::TurnInProgress);
        }
        self.content.clear();
        let turn = TurnId(self.next_turn);
        self.next_turn += 1;
        self.open = Some(turn);
        Ok(turn)
    }

    /// Concatenates `fragment` onto the buffer.
    pub fn extend(&mut self, turn: TurnId, fragment: &str) -> Result<()> {
        self.check(turn)?;
        self.content.push_str(fragment);
        Ok(())
    }

    /// Closes the buffer, optionally replacing its content first.
    pub fn close(&mut self, turn: TurnId, final_content: Option<String>) -> Result<()> {
        self.check(turn)?;
        if let Some(content) = final_content {
            self.content = content;
        }
        self.open = None;
        Ok(())
    }

    /// Replaces the buffer with an error line and closes it.
    pub fn fail(&mut self, turn: TurnId, detail: impl fmt::Display) -> Result<()> {
        self.close(turn, Some(error_content(detail)))
    }

    /// Empties and closes the buffer.
    pub fn clear(&mut self) {
        self.content.clear();
        self.open = None;
    }

    fn check(&self, turn: TurnId) -> Result<()> {
        if self.open == Some(turn) {
            Ok(())
        } else {
            Err(Error::NoOpenMessage)
        }
    }
}

///////////////////////////////////////////// AppState /////////////////////////////////////////////

/// Everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// Current configuration.
    pub settings: Settings,
    /// The chat conversation.
    pub conversation: Conversation,
    /// The execution output.
    pub output: OutputBuffer,
}

impl AppState {
    /// The part of the state that is written to storage.
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot::new(
            self.settings.clone(),
            self.conversation.messages().to_vec(),
        )
    }
}

////////////////////////////////////////////// Store ///////////////////////////////////////////////

/// Something that reacts to store mutations.
pub trait StoreListener: Send {
    /// Called after every successful mutation with the resulting state.
    fn on_change(&mut self, state: &AppState);
}

impl<F> StoreListener for F
where
    F: FnMut(&AppState) + Send,
{
    fn on_change(&mut self, state: &AppState) {
        self(state)
    }
}

/// Handle returned by [`Store::subscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The application store.
pub struct Store {
    state: AppState,
    listeners: Vec<(SubscriptionId, Box<dyn StoreListener>)>,
    next_subscription: u64,
}

/// A store shared between concurrently running turns.
///
/// The lock is only held for the duration of a single mutation, never across an
/// await point.
pub type SharedStore = Arc<Mutex<Store>>;

impl Store {
    /// Creates a store with the given settings and an empty conversation.
    pub fn new(settings: Settings) -> Self {
        Self {
            state: AppState {
                settings,
                ..AppState::default()
            },
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Creates a store from a loaded snapshot, or from `defaults` when there is none.
    pub fn from_snapshot(snapshot: Option<PersistedSnapshot>, defaults: Settings) -> Self {
        match snapshot {
            Some(snapshot) => {
                let mut store = Self::new(snapshot.settings);
                store.state.conversation = Conversation::from_messages(snapshot.messages);
                store
            }
            None => Self::new(defaults),
        }
    }

    /// Wraps the store for sharing between turns.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// The current state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Current settings.
    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    /// The chat conversation.
    pub fn conversation(&self) -> &Conversation {
        &self.state.conversation
    }

    /// The execution output.
    pub fn output(&self) -> &OutputBuffer {
        &self.state.output
    }

    /// Registers a listener to be called after every mutation.
    pub fn subscribe(&mut self, listener: impl StoreListener + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener.  Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    /// Sets the code-generation base URL.
    pub fn set_model_base(&mut self, url: impl Into<String>) -> Result<()> {
        let url = url.into().trim().to_string();
        validate_base_url(&url)?;
        self.mutate(|state| {
            state.settings.model_base = url;
            Ok(())
        })
    }

    /// Sets the code-execution base URL.
    pub fn set_exec_base(&mut self, url: impl Into<String>) -> Result<()> {
        let url = url.into().trim().to_string();
        validate_base_url(&url)?;
        self.mutate(|state| {
            state.settings.exec_base = url;
            Ok(())
        })
    }

    /// Sets the theme.
    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.mutate(|state| {
            state.settings.theme = theme;
            Ok(())
        })
    }

    /// Replaces all settings at once.
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.mutate(|state| {
            state.settings = settings;
            Ok(())
        })
    }

    /// Appends a closed message to the conversation.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        let content = content.into();
        self.mutate(|state| state.conversation.append(role, content))
    }

    /// Appends an empty, open assistant message.
    pub fn append_open_assistant(&mut self) -> Result<TurnId> {
        self.mutate(|state| state.conversation.append_open_assistant())
    }

    /// Appends the prompt and an open assistant message in one mutation.
    pub fn begin_turn(&mut self, prompt: impl Into<String>) -> Result<TurnId> {
        let prompt = prompt.into();
        self.mutate(|state| state.conversation.begin_turn(prompt))
    }

    /// Concatenates a fragment onto the message `turn` opened.
    pub fn extend_open(&mut self, turn: TurnId, fragment: &str) -> Result<()> {
        self.mutate(|state| state.conversation.extend_open(turn, fragment))
    }

    /// Closes the message `turn` opened, optionally replacing its content.
    pub fn close_open(&mut self, turn: TurnId, final_content: Option<String>) -> Result<()> {
        self.mutate(|state| state.conversation.close_open(turn, final_content))
    }

    /// Replaces the message `turn` opened with `"Error: " + detail` and closes it.
    pub fn fail_open(&mut self, turn: TurnId, detail: impl fmt::Display) -> Result<()> {
        self.mutate(|state| state.conversation.fail_open(turn, detail))
    }

    /// Empties the conversation.  A turn still streaming into it can no longer write.
    pub fn clear(&mut self) {
        self.state.conversation.clear();
        STORE_MUTATIONS.click();
        self.notify();
    }

    /// Empties the output buffer and opens it.
    pub fn begin_output(&mut self) -> Result<TurnId> {
        self.mutate(|state| state.output.begin())
    }

    /// Concatenates a fragment onto the output buffer.
    pub fn extend_output(&mut self, turn: TurnId, fragment: &str) -> Result<()> {
        self.mutate(|state| state.output.extend(turn, fragment))
    }

    /// Closes the output buffer, optionally replacing its content.
    pub fn close_output(&mut self, turn: TurnId, final_content: Option<String>) -> Result<()> {
        self.mutate(|state| state.output.close(turn, final_content))
    }

    /// Replaces the output with `"Error: " + detail` and closes it.
    pub fn fail_output(&mut self, turn: TurnId, detail: impl fmt::Display) -> Result<()> {
        self.mutate(|state| state.output.fail(turn, detail))
    }

    /// Empties the output buffer.
    pub fn clear_output(&mut self) {
        self.state.output.clear();
        STORE_MUTATIONS.click();
        self.notify();
    }

    fn mutate<R>(&mut self, f: impl FnOnce(&mut AppState) -> Result<R>) -> Result<R> {
        let result = f(&mut self.state)?;
        STORE_MUTATIONS.click();
        self.notify();
        Ok(result)
    }

    fn notify(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_change(&self.state);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Locks a shared store, recovering the guard if a previous holder panicked.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_store() -> (Store, Arc<Mutex<Vec<AppState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = Store::new(Settings::default());
        let sink = Arc::clone(&seen);
        store.subscribe(move |state: &AppState| {
            sink.lock().unwrap().push(state.clone());
        });
        (store, seen)
    }

    #[test]
    fn fragments_concatenate_into_closed_message() {
        let mut store = Store::new(Settings::default());
        let turn = store.begin_turn("write a function").unwrap();
        store.extend_open(turn, "def f():").unwrap();
        store.extend_open(turn, "\n  pass").unwrap();
        store.close_open(turn, None).unwrap();

        let messages = store.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::user("write a function"));
        assert_eq!(messages[1], Message::assistant("def f():\n  pass"));
        assert!(!store.conversation().is_open());
    }

    #[test]
    fn extend_after_close_is_rejected() {
        let mut store = Store::new(Settings::default());
        let turn = store.begin_turn("p").unwrap();
        store.close_open(turn, Some("done".to_string())).unwrap();

        assert!(store.extend_open(turn, "more").unwrap_err().is_no_open_message());
        assert!(store.close_open(turn, None).unwrap_err().is_no_open_message());
        assert_eq!(store.conversation().messages()[1].content, "done");
    }

    #[test]
    fn only_one_open_message() {
        let mut store = Store::new(Settings::default());
        store.begin_turn("first").unwrap();

        assert!(store.begin_turn("second").unwrap_err().is_turn_in_progress());
        assert!(store.append_open_assistant().unwrap_err().is_turn_in_progress());
        assert!(store.append(Role::User, "late").unwrap_err().is_turn_in_progress());
        assert_eq!(store.conversation().len(), 2);
    }

    #[test]
    fn append_then_open_assistant() {
        let mut conversation = Conversation::new();
        conversation.append(Role::User, "prompt").unwrap();
        conversation.append_open_assistant().unwrap();
        assert_eq!(conversation.open_message(), Some(&Message::assistant("")));
    }

    #[test]
    fn failure_replaces_partial_content() {
        let mut store = Store::new(Settings::default());
        let turn = store.begin_turn("p").unwrap();
        store.extend_open(turn, "half of an ans").unwrap();
        store.fail_open(turn, "stream failed").unwrap();

        assert_eq!(
            store.conversation().messages()[1].content,
            "Error: stream failed"
        );
        assert!(!store.conversation().is_open());
    }

    #[test]
    fn every_mutation_notifies_listeners() {
        let (mut store, seen) = recording_store();
        let turn = store.begin_turn("p").unwrap();
        store.extend_open(turn, "a").unwrap();
        store.close_open(turn, None).unwrap();
        store.set_theme(Theme::Light).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[0].conversation.is_open());
        assert_eq!(seen[1].conversation.messages()[1].content, "a");
        assert_eq!(seen[3].settings.theme, Theme::Light);
    }

    #[test]
    fn failed_mutation_does_not_notify() {
        let (mut store, seen) = recording_store();
        let turn = Conversation::new().begin_turn("elsewhere").unwrap();
        assert!(store.extend_open(turn, "x").is_err());
        assert!(store.set_model_base("not a url").is_err());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.settings(), &Settings::default());
    }

    #[test]
    fn clear_closes_open_message_with_one_notification() {
        let (mut store, seen) = recording_store();
        let turn = store.begin_turn("p").unwrap();
        store.clear();

        assert!(store.conversation().is_empty());
        assert!(!store.conversation().is_open());
        assert!(store.extend_open(turn, "late").unwrap_err().is_no_open_message());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].snapshot().messages.is_empty());
    }

    #[test]
    fn cleared_turn_cannot_write_into_next_turn() {
        let mut store = Store::new(Settings::default());
        let first = store.begin_turn("A").unwrap();
        store.extend_open(first, "A1").unwrap();
        store.clear();
        let second = store.begin_turn("B").unwrap();
        assert_ne!(first, second);

        assert!(store.extend_open(first, "A2").unwrap_err().is_no_open_message());
        assert!(store.close_open(first, None).unwrap_err().is_no_open_message());
        assert!(store.conversation().is_open());

        store.extend_open(second, "B1").unwrap();
        store.close_open(second, None).unwrap();
        assert_eq!(
            store.conversation().messages(),
            &[Message::user("B"), Message::assistant("B1")]
        );
    }

    #[test]
    fn cleared_output_run_cannot_write_into_next_run() {
        let mut store = Store::new(Settings::default());
        let first = store.begin_output().unwrap();
        store.clear_output();
        let second = store.begin_output().unwrap();

        assert!(store.extend_output(first, "stale").unwrap_err().is_no_open_message());
        store.extend_output(second, "fresh").unwrap();
        store.close_output(second, None).unwrap();
        assert_eq!(store.output().content(), "fresh");
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let seen = Arc::new(Mutex::new(0));
        let mut store = Store::new(Settings::default());
        let counter = Arc::clone(&seen);
        let id = store.subscribe(move |_: &AppState| *counter.lock().unwrap() += 1);

        store.append(Role::User, "one").unwrap();
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.append(Role::User, "two").unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn output_buffer_lifecycle() {
        let mut store = Store::new(Settings::default());
        let run = store.begin_output().unwrap();
        store.extend_output(run, "hi\n").unwrap();
        assert!(store.begin_output().unwrap_err().is_turn_in_progress());
        store.close_output(run, None).unwrap();
        assert_eq!(store.output().content(), "hi\n");

        let run = store.begin_output().unwrap();
        assert_eq!(store.output().content(), "");
        store.fail_output(run, "stream failed").unwrap();
        assert_eq!(store.output().content(), "Error: stream failed");
        assert!(store.extend_output(run, "x").unwrap_err().is_no_open_message());
    }

    #[test]
    fn rehydrated_messages_are_closed() {
        let snapshot = PersistedSnapshot::new(
            Settings::new("http://models:8000", "http://exec:5000", Theme::Light),
            vec![Message::user("p"), Message::assistant("partial")],
        );
        let store = Store::from_snapshot(Some(snapshot.clone()), Settings::default());
        assert_eq!(store.state().snapshot(), snapshot);
        assert!(!store.conversation().is_open());

        let store = Store::from_snapshot(None, Settings::default());
        assert!(store.conversation().is_empty());
        assert_eq!(store.settings(), &Settings::default());
    }

    #[test]
    fn settings_edits_are_validated() {
        let mut store = Store::new(Settings::default());
        store.set_model_base(" http://gpu-box:8000/ ").unwrap();
        assert_eq!(store.settings().model_base, "http://gpu-box:8000/");
        assert!(store.set_exec_base("exec:5000").is_err());
        assert!(
            store
                .update_settings(Settings::new("http://a", "nope", Theme::Dark))
                .is_err()
        );
    }
}
