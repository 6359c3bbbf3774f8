//! Interactive coding-agent REPL.
//!
//! Prompts go to the code-generation service and the reply is streamed into the
//! conversation.  `/run` sends code to the execution service.  The conversation and
//! settings are saved after every change and restored on the next start.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with settings from the environment or the last session
//! codeagent-chat
//!
//! # Point at a different model server
//! codeagent-chat --model-base http://gpu-box:8000
//!
//! # Keep state somewhere else
//! codeagent-chat --state-dir ~/.local/state/codeagent
//!
//! # Use the one-shot endpoints and plain output
//! codeagent-chat --no-stream --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/run <code>` - Execute code
//! - `/clear` - Clear conversation history
//! - `/settings` - Show the current settings
//! - `/quit` - Exit the application

use std::sync::{Arc, Mutex, PoisonError};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use codeagent::Message;
use codeagent::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, Service,
    help_text, parse_command,
};

/// Main entry point for the codeagent-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("codeagent-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let use_color = config.use_color;

    let mut session = ChatSession::open(&config)?;
    let mut renderer = PlainTextRenderer::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Token for the turn in flight; replaced before each turn.
    let current = Arc::new(Mutex::new(CancellationToken::new()));

    let current_clone = current.clone();
    ctrlc::set_handler(move || {
        current_clone
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    })?;

    let settings = session.settings();
    println!(
        "Coding agent (model: {}, exec: {})",
        settings.model_base, settings.exec_base
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::ClearOutput => {
                            session.clear_output();
                            renderer.print_info("Output cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Run(code) => {
                            let cancel = fresh_token(&current);
                            if let Err(e) = session.run(&code, &mut renderer, &cancel).await {
                                renderer.print_error(&(), &e.to_string());
                            }
                        }
                        ChatCommand::RunFile(path) => match std::fs::read_to_string(&path) {
                            Ok(code) => {
                                let cancel = fresh_token(&current);
                                if let Err(e) = session.run(&code, &mut renderer, &cancel).await {
                                    renderer.print_error(&(), &e.to_string());
                                }
                            }
                            Err(err) => {
                                renderer.print_error(&(), &format!("Failed to read {path}: {err}"))
                            }
                        },
                        ChatCommand::Output => {
                            let output = session.output();
                            if output.is_empty() {
                                renderer.print_info("(no output)");
                            } else {
                                println!("{output}");
                            }
                        }
                        ChatCommand::History => {
                            print_history(&session.messages());
                        }
                        ChatCommand::Settings => {
                            print_settings(&session);
                        }
                        ChatCommand::ModelBase(url) => match session.set_model_base(&url) {
                            Ok(()) => renderer.print_info(&format!("Model base set to {url}")),
                            Err(err) => renderer.print_error(&(), &err.to_string()),
                        },
                        ChatCommand::ExecBase(url) => match session.set_exec_base(&url) {
                            Ok(()) => renderer.print_info(&format!("Exec base set to {url}")),
                            Err(err) => renderer.print_error(&(), &err.to_string()),
                        },
                        ChatCommand::Theme(theme) => match session.set_theme(theme) {
                            Ok(()) => renderer.print_info(&format!("Theme set to {theme}")),
                            Err(err) => renderer.print_error(&(), &err.to_string()),
                        },
                        ChatCommand::Stream(streaming) => {
                            session.set_streaming(streaming);
                            if streaming {
                                renderer.print_info("Streaming enabled.");
                            } else {
                                renderer.print_info("Streaming disabled.");
                            }
                        }
                        ChatCommand::Health(service) => {
                            let services = match service {
                                Some(service) => vec![service],
                                None => vec![Service::Model, Service::Exec],
                            };
                            for service in services {
                                let name = match service {
                                    Service::Model => "model",
                                    Service::Exec => "exec",
                                };
                                match session.health(service).await {
                                    Ok(message) => {
                                        renderer.print_info(&format!("{name}: {message}"))
                                    }
                                    Err(err) => renderer.print_error(&(), &format!("{name}: {err}")),
                                }
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&(), &message);
                        }
                    }
                    continue;
                }

                let cancel = fresh_token(&current);
                if let Err(e) = session.send(line, &mut renderer, &cancel).await {
                    renderer.print_error(&(), &e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&(), &format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn fresh_token(current: &Mutex<CancellationToken>) -> CancellationToken {
    let token = CancellationToken::new();
    *current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
    token
}

fn print_history(messages: &[Message]) {
    if messages.is_empty() {
        println!("    (no messages)");
        return;
    }
    for message in messages {
        println!("    {}:", message.role);
        for line in message.content.lines() {
            println!("      {}", line);
        }
    }
}

fn print_settings(session: &ChatSession) {
    let stats = session.stats();
    println!("    Current Settings:");
    println!("      Model base: {}", stats.settings.model_base);
    println!("      Exec base: {}", stats.settings.exec_base);
    println!("      Theme: {}", stats.settings.theme);
    println!(
        "      Streaming: {}",
        if stats.streaming { "on" } else { "off" }
    );
    println!("      Retries: {}", stats.retries);
    println!("      Timeout: {}ms", stats.timeout.as_millis());
    println!("      Messages: {}", stats.message_count);
    if stats.chat_open || stats.output_open {
        println!("      Turn in flight: yes");
    }
}
