//! Core types and trait definitions for chanpass.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! storage backend, the messaging-platform client and the lifecycle engine
//! all depend on it; it depends on nothing of theirs.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod catalog;
pub mod clock;
pub mod error;
pub mod store;
pub mod subscription;

pub use error::{Error, Result};
