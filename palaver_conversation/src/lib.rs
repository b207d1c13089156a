#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Multi-turn conversation engine over a single shared inference backend.
//!
//! # Key Features
//! - Bounded per-conversation history with a pinned system message
//! - Streaming generation through a single-admission gate
//! - Validated runtime parameters, shared or per conversation
//! - A small `/command` grammar with privileged and open commands

mod command;
mod console;
mod dispatcher;
mod history;
mod manager;
mod pipeline;
mod session;
mod tenants;

pub use command::{COMMAND_PREFIX, Command};
pub use console::run_interactive;
pub use dispatcher::{Dispatcher, Outcome};
pub use history::{ConversationHistory, DEFAULT_WINDOW, HistoryStats};
pub use manager::SessionManager;
pub use pipeline::{AdmissionGate, GenerationPipeline, GenerationState, StreamEvent};
pub use session::ConversationSession;
pub use tenants::{LabelStore, Labels, TenantDirectory};
