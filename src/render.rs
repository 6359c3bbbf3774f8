//! Output rendering for streamed turns.
//!
//! Presentation lives outside this crate.  The [`Renderer`] trait is the seam through
//! which a turn echoes fragments as they arrive; the store remains the source of
//! truth for what was said.

use std::io::{self, Stdout, Write};

/// ANSI escape code for dim text (used for informational lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for turn labels).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for yellow text (used for interruptions).
const ANSI_YELLOW: &str = "\x1b[33m";

/// Which pane a turn writes into.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TurnKind {
    /// A chat turn against the code-generation service.
    Chat,
    /// A run against the code-execution service.
    Execute,
}

/// Stream context information for renderer output.
pub trait StreamContext: Send + Sync {
    /// Display label for the stream, if any.
    fn label(&self) -> Option<&str> {
        None
    }
}

impl StreamContext for TurnKind {
    fn label(&self) -> Option<&str> {
        match self {
            TurnKind::Chat => Some("assistant"),
            TurnKind::Execute => Some("output"),
        }
    }
}

impl StreamContext for () {}

/// Trait for rendering streaming output.
pub trait Renderer: Send {
    /// Called when a turn's response begins.
    fn start_response(&mut self, context: &dyn StreamContext) {
        _ = context;
    }

    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments arrive.
    fn print_text(&mut self, context: &dyn StreamContext, text: &str);

    /// Print an error message.
    fn print_error(&mut self, context: &dyn StreamContext, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    fn finish_response(&mut self, context: &dyn StreamContext);

    /// Called when the stream is cancelled by the user.
    fn print_interrupted(&mut self, context: &dyn StreamContext) {
        _ = context;
    }
}

/// A renderer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn print_text(&mut self, _: &dyn StreamContext, _: &str) {}

    fn print_error(&mut self, _: &dyn StreamContext, _: &str) {}

    fn print_info(&mut self, _: &str) {}

    fn finish_response(&mut self, _: &dyn StreamContext) {}
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn ensure_newline(&mut self) {
        if !self.line_start {
            println!();
            self.line_start = true;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self, context: &dyn StreamContext) {
        if let Some(label) = context.label() {
            self.ensure_newline();
            print!("{} ", self.styled(ANSI_CYAN, &format!("{label}:")));
            self.line_start = false;
            self.flush();
        }
    }

    fn print_text(&mut self, _: &dyn StreamContext, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn print_error(&mut self, _: &dyn StreamContext, error: &str) {
        self.ensure_newline();
        println!("{}", self.styled(ANSI_RED, error));
        self.line_start = true;
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        self.ensure_newline();
        println!("{}", self.styled(ANSI_DIM, info));
        self.flush();
    }

    fn finish_response(&mut self, _: &dyn StreamContext) {
        self.ensure_newline();
        self.flush();
    }

    fn print_interrupted(&mut self, _: &dyn StreamContext) {
        self.ensure_newline();
        println!("{}", self.styled(ANSI_YELLOW, "[interrupted]"));
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_labels() {
        assert_eq!(TurnKind::Chat.label(), Some("assistant"));
        assert_eq!(TurnKind::Execute.label(), Some("output"));
        assert_eq!(().label(), None);
    }

    #[test]
    fn styling_respects_color_setting() {
        let plain = PlainTextRenderer::with_color(false);
        assert_eq!(plain.styled(ANSI_RED, "boom"), "boom");
        let colored = PlainTextRenderer::with_color(true);
        assert_eq!(colored.styled(ANSI_RED, "boom"), "\x1b[31mboom\x1b[0m");
    }
}
