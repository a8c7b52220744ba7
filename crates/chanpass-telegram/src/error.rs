//! Error type for `chanpass-telegram`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),

  #[error("bot token is empty")]
  MissingToken,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
