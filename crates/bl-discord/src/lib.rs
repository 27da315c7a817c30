//! Discord adapter (twilight).
//!
//! This crate implements the `bl-core` ChatPlatform port over the Discord
//! REST API and feeds gateway events into the command dispatcher.

pub mod gateway;
pub mod platform;

pub use platform::DiscordPlatform;
