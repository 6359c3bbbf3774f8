//! Turns: the user actions that move data from the services into the store.
//!
//! A chat turn appends the prompt and an open assistant message, then fills that
//! message from the code-generation service.  An execution turn opens the output
//! buffer and fills it from the code-execution service.  Each turn resolves its base
//! URL once, when it starts.  Request and stream failures end up as `"Error: "` text in
//! the slice the turn was filling; they are not returned to the caller.  A turn whose
//! slice is cleared while it runs stops writing and drops its stream.

use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::render::{Renderer, TurnKind};
use crate::store::{SharedStore, Store, TurnId, error_content, lock};
use crate::stream::FragmentStream;
use crate::types::{ExecuteCodeParams, GenerateCodeParams, Settings};

/// Runs chat and execution turns against a shared store.
///
/// Methods take `&self`, so a chat turn and an execution turn may run concurrently
/// (e.g. under `tokio::join!`); they fill different slices of the store.
#[derive(Debug, Clone)]
pub struct Workbench {
    client: Client,
    store: SharedStore,
    generation: GenerateCodeParams,
    execution: ExecuteCodeParams,
}

impl Workbench {
    /// Creates a workbench over `store`.
    pub fn new(client: Client, store: SharedStore) -> Self {
        Self {
            client,
            store,
            generation: GenerateCodeParams::default(),
            execution: ExecuteCodeParams::default(),
        }
    }

    /// Sets the generation fields sent with every prompt.  The prompt itself is
    /// replaced per turn.
    pub fn with_generation_defaults(mut self, params: GenerateCodeParams) -> Self {
        self.generation = params;
        self
    }

    /// Sets the execution limits sent with every run.  The code itself is replaced
    /// per turn.
    pub fn with_execution_defaults(mut self, params: ExecuteCodeParams) -> Self {
        self.execution = params;
        self
    }

    /// The HTTP client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The shared store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// A copy of the current settings.
    pub fn settings(&self) -> Settings {
        lock(&self.store).settings().clone()
    }

    /// Sends `prompt` to the one-shot generation endpoint.
    ///
    /// Returns an error only when the turn cannot start because another chat turn is
    /// open.
    pub async fn send(&self, prompt: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let (turn, model_base) = self.begin(TurnKind::Chat, prompt)?;
        let params = GenerateCodeParams {
            prompt: prompt.to_string(),
            ..self.generation.clone()
        };
        renderer.start_response(&TurnKind::Chat);
        let result = self.client.generate_code(&model_base, &params).await;
        let outcome = result.map(|response| response.generated_code);
        self.finish_one_shot(TurnKind::Chat, turn, outcome, renderer)
    }

    /// Sends `prompt` to the streaming generation endpoint, filling the open message
    /// fragment by fragment.
    ///
    /// Cancelling `cancel` ends the stream early; the message keeps what arrived.
    pub async fn send_streaming(
        &self,
        prompt: &str,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (turn, model_base) = self.begin(TurnKind::Chat, prompt)?;
        let params = GenerateCodeParams {
            prompt: prompt.to_string(),
            ..self.generation.clone()
        };
        renderer.start_response(&TurnKind::Chat);
        let opened = self.client.generate_code_stream(&model_base, &params).await;
        self.consume(TurnKind::Chat, turn, opened, renderer, cancel)
            .await
    }

    /// Runs `code` on the one-shot execution endpoint.
    ///
    /// The output buffer ends up as the logs followed by the exit code.
    pub async fn run(&self, code: &str, renderer: &mut dyn Renderer) -> Result<()> {
        let (turn, exec_base) = self.begin(TurnKind::Execute, code)?;
        let params = ExecuteCodeParams {
            code: code.to_string(),
            ..self.execution.clone()
        };
        renderer.start_response(&TurnKind::Execute);
        let result = self.client.execute_code(&exec_base, &params).await;
        let outcome = result.map(|response| response.display());
        self.finish_one_shot(TurnKind::Execute, turn, outcome, renderer)
    }

    /// Runs `code` on the streaming execution endpoint.
    pub async fn run_streaming(
        &self,
        code: &str,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (turn, exec_base) = self.begin(TurnKind::Execute, code)?;
        let params = ExecuteCodeParams {
            code: code.to_string(),
            ..self.execution.clone()
        };
        renderer.start_response(&TurnKind::Execute);
        let opened = self.client.execute_code_stream(&exec_base, &params).await;
        self.consume(TurnKind::Execute, turn, opened, renderer, cancel)
            .await
    }

    /// Opens the turn's slice and returns its id with the base URL the turn will use.
    fn begin(&self, kind: TurnKind, input: &str) -> Result<(TurnId, String)> {
        let mut store = lock(&self.store);
        let (turn, base) = match kind {
            TurnKind::Chat => (store.begin_turn(input)?, store.settings().model_base.clone()),
            TurnKind::Execute => (store.begin_output()?, store.settings().exec_base.clone()),
        };
        tracing::debug!(?kind, ?turn, base = %base, "turn started");
        Ok((turn, base))
    }

    fn finish_one_shot(
        &self,
        kind: TurnKind,
        turn: TurnId,
        outcome: Result<String>,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        match outcome {
            Ok(content) => {
                if self.apply(kind, |store| close(store, kind, turn, Some(content.clone())))? {
                    renderer.print_text(&kind, &content);
                    renderer.finish_response(&kind);
                }
                Ok(())
            }
            Err(err) => self.fail(kind, turn, &err, renderer),
        }
    }

    async fn consume(
        &self,
        kind: TurnKind,
        turn: TurnId,
        opened: Result<FragmentStream>,
        renderer: &mut dyn Renderer,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut fragments = match opened {
            Ok(fragments) => fragments.with_cancellation(cancel.clone()),
            Err(err) => return self.fail(kind, turn, &err, renderer),
        };
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(fragment) => {
                    if !self.apply(kind, |store| extend(store, kind, turn, &fragment))? {
                        fragments.close();
                        renderer.print_interrupted(&kind);
                        return Ok(());
                    }
                    renderer.print_text(&kind, &fragment);
                }
                Err(err) => return self.fail(kind, turn, &err, renderer),
            }
        }
        if cancel.is_cancelled() {
            renderer.print_interrupted(&kind);
        }
        renderer.finish_response(&kind);
        self.apply(kind, |store| close(store, kind, turn, None))?;
        Ok(())
    }

    fn fail(
        &self,
        kind: TurnKind,
        turn: TurnId,
        err: &Error,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        tracing::warn!(?kind, error = %err, "turn failed");
        let detail = err.detail();
        if self.apply(kind, |store| match kind {
            TurnKind::Chat => store.fail_open(turn, &detail),
            TurnKind::Execute => store.fail_output(turn, &detail),
        })? {
            renderer.print_error(&kind, &error_content(&detail));
        }
        Ok(())
    }

    /// Applies `f` to the store.  Returns `Ok(false)` when the turn's slice was cleared
    /// or taken over by a later turn.
    fn apply(&self, kind: TurnKind, f: impl FnOnce(&mut Store) -> Result<()>) -> Result<bool> {
        match f(&mut lock(&self.store)) {
            Ok(()) => Ok(true),
            Err(err) if err.is_no_open_message() => {
                tracing::info!(?kind, "turn abandoned after its slice was cleared");
                Ok(false)
            }
            Err(err) => {
                tracing::error!(?kind, error = %err, "turn could not update the store");
                Err(err)
            }
        }
    }
}

fn extend(store: &mut Store, kind: TurnKind, turn: TurnId, fragment: &str) -> Result<()> {
    match kind {
        TurnKind::Chat => store.extend_open(turn, fragment),
        TurnKind::Execute => store.extend_output(turn, fragment),
    }
}

fn close(store: &mut Store, kind: TurnKind, turn: TurnId, content: Option<String>) -> Result<()> {
    match kind {
        TurnKind::Chat => store.close_open(turn, content),
        TurnKind::Execute => store.close_output(turn, content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NullRenderer;
    use crate::types::Theme;

    fn workbench(settings: Settings) -> Workbench {
        Workbench::new(Client::new().unwrap(), Store::new(settings).into_shared())
    }

    #[tokio::test]
    async fn second_chat_turn_is_rejected_while_open() {
        let wb = workbench(Settings::default());
        lock(wb.store()).begin_turn("first").unwrap();

        let err = wb
            .send_streaming("second", &mut NullRenderer, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_turn_in_progress());
        assert_eq!(lock(wb.store()).conversation().len(), 2);
    }

    #[tokio::test]
    async fn stream_handshake_failure_becomes_error_message() {
        // Port 9 (discard) on loopback is not listening in test environments.
        let wb = workbench(Settings::new(
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            Theme::Dark,
        ));

        wb.send_streaming("p", &mut NullRenderer, &CancellationToken::new())
            .await
            .unwrap();

        let store = lock(wb.store());
        let messages = store.conversation().messages();
        assert!(!store.conversation().is_open());
        assert!(messages[1].content.starts_with("Error: stream failed"));
    }

    #[test]
    fn turn_captures_base_url_at_start() {
        let wb = workbench(Settings::default());
        let (_, base) = wb.begin(TurnKind::Execute, "print(1)").unwrap();
        lock(wb.store())
            .set_exec_base("http://elsewhere:5000")
            .unwrap();
        assert_eq!(base, "http://localhost:5000");
        assert!(lock(wb.store()).output().is_open());
    }

    #[tokio::test]
    async fn cleared_turn_is_abandoned_quietly() {
        let wb = workbench(Settings::default());
        let (turn, _) = wb.begin(TurnKind::Chat, "A").unwrap();
        lock(wb.store()).clear();
        let (next, _) = wb.begin(TurnKind::Chat, "B").unwrap();

        let outcome = Ok("stale reply".to_string());
        wb.finish_one_shot(TurnKind::Chat, turn, outcome, &mut NullRenderer)
            .unwrap();
        let err = Error::streaming("connection reset", None);
        wb.fail(TurnKind::Chat, turn, &err, &mut NullRenderer).unwrap();

        let store = lock(wb.store());
        assert_eq!(store.conversation().len(), 2);
        assert_eq!(store.conversation().messages()[0].content, "B");
        assert_eq!(store.conversation().messages()[1].content, "");
        assert!(store.conversation().is_open());
        drop(store);

        let outcome = Ok("fresh reply".to_string());
        wb.finish_one_shot(TurnKind::Chat, next, outcome, &mut NullRenderer)
            .unwrap();
        assert_eq!(
            lock(wb.store()).conversation().messages()[1].content,
            "fresh reply"
        );
    }
}
