#![deny(
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

//! Telegram relay: every chat is its own conversation against the shared
//! session engine.

mod bot;
mod command;
mod error;
mod handler;
mod store;

pub use bot::TelegramBot;
pub use command::Command;
pub use error::{Error, Result};
pub use store::JsonFileLabelStore;
