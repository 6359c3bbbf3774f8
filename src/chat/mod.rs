//! Chat application module for an interactive coding-agent session.
//!
//! This module provides a REPL interface built on top of the codeagent client
//! library. It supports:
//!
//! - Streaming code generation with real-time fragment display
//! - Running code against the execution service
//! - Slash commands for session control and settings edits
//! - State that survives restarts
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Wiring of storage, store, and workbench
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer, StreamContext};
pub use commands::{ChatCommand, Service, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_STATE_DIR, STATE_DIR_ENV};
pub use session::{ChatSession, SessionStats};
