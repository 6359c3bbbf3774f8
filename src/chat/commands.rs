//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the session without sending a prompt to the
//! code-generation service.

use crate::types::Theme;

/// Which backend a command refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Service {
    /// The code-generation service.
    Model,
    /// The code-execution service.
    Exec,
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Clear the conversation history.
    Clear,

    /// Execute a line of code.
    Run(String),

    /// Execute the contents of a file.
    RunFile(String),

    /// Show the execution output.
    Output,

    /// Clear the execution output.
    ClearOutput,

    /// Print the conversation.
    History,

    /// Show the current settings.
    Settings,

    /// Change the code-generation base URL.
    ModelBase(String),

    /// Change the code-execution base URL.
    ExecBase(String),

    /// Change the theme.
    Theme(Theme),

    /// Switch between streaming and one-shot endpoints.
    Stream(bool),

    /// Check that one or both services answer.  `None` checks both.
    Health(Option<Service>),

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a prompt.
///
/// # Examples
///
/// ```
/// # use codeagent::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/run print(1)").is_some());
/// assert!(parse_command("write a function").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "clear" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("output") => ChatCommand::ClearOutput,
            Some(_) => ChatCommand::Invalid("/clear takes no argument or 'output'".to_string()),
            None => ChatCommand::Clear,
        },
        "run" => match argument {
            Some(code) => ChatCommand::Run(code.to_string()),
            None => ChatCommand::Invalid("/run requires code".to_string()),
        },
        "runfile" => match argument {
            Some(path) => ChatCommand::RunFile(path.to_string()),
            None => ChatCommand::Invalid("/runfile requires a file path".to_string()),
        },
        "output" => ChatCommand::Output,
        "history" => ChatCommand::History,
        "settings" | "config" => ChatCommand::Settings,
        "model-base" => match argument {
            Some(url) => ChatCommand::ModelBase(url.to_string()),
            None => ChatCommand::Invalid("/model-base requires a URL".to_string()),
        },
        "exec-base" => match argument {
            Some(url) => ChatCommand::ExecBase(url.to_string()),
            None => ChatCommand::Invalid("/exec-base requires a URL".to_string()),
        },
        "theme" => match argument.map(str::parse::<Theme>) {
            Some(Ok(theme)) => ChatCommand::Theme(theme),
            _ => ChatCommand::Invalid("/theme expects 'dark' or 'light'".to_string()),
        },
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        "health" => match argument.map(str::to_lowercase).as_deref() {
            None => ChatCommand::Health(None),
            Some("model") => ChatCommand::Health(Some(Service::Model)),
            Some("exec") => ChatCommand::Health(Some(Service::Exec)),
            Some(_) => ChatCommand::Invalid("/health expects 'model' or 'exec'".to_string()),
        },
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /run <code>            Execute a line of code
  /runfile <path>        Execute the contents of a file
  /output                Show the last execution output
  /clear                 Clear conversation history
  /clear output          Clear the execution output
  /history               Print the conversation
  /settings              Show current settings
  /model-base <url>      Set the code-generation service URL
  /exec-base <url>       Set the code-execution service URL
  /theme dark|light      Set the theme
  /stream on|off         Use streaming or one-shot endpoints
  /health [model|exec]   Check that the services answer
  /help                  Show this help message
  /quit                  Exit the chat
Anything else is sent as a prompt."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
        assert_eq!(
            parse_command("/clear output"),
            Some(ChatCommand::ClearOutput)
        );
        assert!(matches!(
            parse_command("/clear everything"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_run_keeps_code_verbatim() {
        assert_eq!(
            parse_command("/run print(\"Hello from sandbox\")"),
            Some(ChatCommand::Run("print(\"Hello from sandbox\")".to_string()))
        );
        assert_eq!(
            parse_command("/runfile ./script.py"),
            Some(ChatCommand::RunFile("./script.py".to_string()))
        );
        assert_eq!(
            parse_command("/run"),
            Some(ChatCommand::Invalid("/run requires code".to_string()))
        );
    }

    #[test]
    fn parse_settings_edits() {
        assert_eq!(
            parse_command("/model-base http://gpu:8000"),
            Some(ChatCommand::ModelBase("http://gpu:8000".to_string()))
        );
        assert_eq!(
            parse_command("/exec-base   http://sandbox:5000  "),
            Some(ChatCommand::ExecBase("http://sandbox:5000".to_string()))
        );
        assert_eq!(
            parse_command("/theme light"),
            Some(ChatCommand::Theme(Theme::Light))
        );
        assert!(matches!(
            parse_command("/theme neon"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
    }

    #[test]
    fn parse_stream_toggle() {
        assert_eq!(parse_command("/stream on"), Some(ChatCommand::Stream(true)));
        assert_eq!(parse_command("/stream off"), Some(ChatCommand::Stream(false)));
        assert!(matches!(
            parse_command("/stream maybe"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
    }

    #[test]
    fn parse_health() {
        assert_eq!(parse_command("/health"), Some(ChatCommand::Health(None)));
        assert_eq!(
            parse_command("/health exec"),
            Some(ChatCommand::Health(Some(Service::Exec)))
        );
        assert!(matches!(
            parse_command("/health db"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("write a function"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/run"));
        assert!(help.contains("/model-base"));
    }
}
