//! Telegram Bot API client for chanpass.
//!
//! [`BotClient`] implements the grant, revoke and notify collaborator traits
//! from [`chanpass_core::access`] against the Bot API's JSON-over-HTTPS
//! methods.

mod client;

pub mod error;

pub use client::{BotClient, BotConfig};
pub use error::{Error, Result};
