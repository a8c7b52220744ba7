//! Error types for `chanpass-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid duration {0:?}: expected a number followed by d, h, m or s")]
  InvalidDuration(String),

  #[error("duplicate catalog entry: {stream}/{subject}")]
  DuplicateProduct { stream: String, subject: String },

  #[error("catalog entry {stream}/{subject} has an empty channel")]
  MissingChannel { stream: String, subject: String },

  #[error("unknown subscription status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
