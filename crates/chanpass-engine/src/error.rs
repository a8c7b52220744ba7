//! Error type for `chanpass-engine`.
//!
//! Only failures that change what the caller must do are errors. Collaborator
//! failures after the store write are logged and counted instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The event names a product the catalog does not know. Acknowledge it;
  /// redelivery cannot help.
  #[error("unknown product: {stream}/{subject}")]
  UnknownProduct { stream: String, subject: String },

  /// The payment id was already applied to another subscription.
  /// Acknowledge it; redelivery cannot help.
  #[error("payment {payment_id} already applied to another subscription")]
  PaymentConflict { payment_id: String },

  /// The event is malformed. Acknowledge it; redelivery cannot help.
  #[error("invalid payment event: {0}")]
  InvalidEvent(String),

  /// Persistence failed; nothing was recorded and the whole purchase may be
  /// retried.
  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::StoreUnavailable(Box::new(e))
  }

  /// Whether the event source should redeliver the event.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::StoreUnavailable(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
