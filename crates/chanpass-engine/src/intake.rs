//! Payment event intake: turns an inbound paid event into a
//! [`PurchaseCommand`].
//!
//! Validation is structural only. Whether the product exists is decided by
//! the engine against the catalog.

use chanpass_core::subscription::{ProductId, SubscriberId};
use serde::Deserialize;

use crate::{Error, Result};

/// A completed payment as delivered by the payment provider. Delivery is
/// at-least-once.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentEvent {
  /// Provider-side payment id; used to recognise redelivery.
  pub payment_id:              Option<String>,
  /// Messaging-platform user id, as the provider echoes it back.
  pub subscriber_id:           Option<String>,
  pub subscriber_display_name: Option<String>,
  pub stream:                  Option<String>,
  pub subject:                 Option<String>,
  /// Amount in minor currency units.
  #[serde(default)]
  pub amount_paid:             i64,
}

/// A validated purchase, ready for [`Engine::purchase`](crate::Engine::purchase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseCommand {
  pub subscriber_id: SubscriberId,
  pub display_name:  Option<String>,
  pub product_id:    ProductId,
  pub amount_paid:   i64,
  pub payment_id:    Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

/// Validate and normalise `event`. `default_stream` is used when the event
/// does not name one.
pub fn validate(event: PaymentEvent, default_stream: &str) -> Result<PurchaseCommand> {
  let raw_id = non_empty(event.subscriber_id)
    .ok_or_else(|| Error::InvalidEvent("missing subscriber id".into()))?;
  let subscriber_id = raw_id.parse::<i64>().map(SubscriberId).map_err(|_| {
    Error::InvalidEvent(format!("subscriber id {raw_id:?} is not numeric"))
  })?;

  let subject = non_empty(event.subject)
    .ok_or_else(|| Error::InvalidEvent("missing subject".into()))?;
  let stream = non_empty(event.stream).unwrap_or_else(|| default_stream.to_owned());

  if event.amount_paid <= 0 {
    return Err(Error::InvalidEvent(format!(
      "amount {} is not positive",
      event.amount_paid
    )));
  }

  Ok(PurchaseCommand {
    subscriber_id,
    display_name: non_empty(event.subscriber_display_name),
    product_id: ProductId::new(stream, subject),
    amount_paid: event.amount_paid,
    payment_id: non_empty(event.payment_id),
  })
}
