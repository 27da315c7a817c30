//! Core domain + application logic for the BlackListener moderation bot.
//!
//! This crate is intentionally framework-agnostic. The Discord client lives
//! behind the [`platform::ChatPlatform`] port implemented in the adapter
//! crate; process exit goes through [`supervisor::ProcessControl`] so the
//! lifecycle state machine stays testable.

pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod event;
pub mod gate;
pub mod ledger;
pub mod logging;
pub mod platform;
pub mod purge;
pub mod report;
pub mod settings;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
