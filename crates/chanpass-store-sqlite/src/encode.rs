//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as integer Unix milliseconds so the reconcile
//! queries compare them numerically. Status is stored as its lowercase name.

use std::str::FromStr as _;

use chanpass_core::subscription::{
  DueExpiration, DueReminder, ProductId, ResourceRef, SubscriberId,
  Subscription, SubscriptionStatus,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> i64 { dt.timestamp_millis() }

pub fn decode_dt(ms: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms).ok_or(Error::Timestamp(ms))
}

// ─── SubscriptionStatus ──────────────────────────────────────────────────────

pub fn encode_status(s: SubscriptionStatus) -> &'static str { s.into() }

pub fn decode_status(s: &str) -> Result<SubscriptionStatus> {
  SubscriptionStatus::from_str(s)
    .map_err(|_| chanpass_core::Error::UnknownStatus(s.to_owned()).into())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub subscriber_id:    i64,
  pub stream:           String,
  pub subject:          String,
  pub resource_ref:     String,
  pub purchased_at:     i64,
  pub expires_at:       i64,
  pub status:           String,
  pub last_reminded_at: Option<i64>,
}

/// Column list matching [`RawSubscription::from_row`].
pub const SUBSCRIPTION_COLUMNS: &str = "subscriber_id, stream, subject, \
   resource_ref, purchased_at, expires_at, status, last_reminded_at";

impl RawSubscription {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscriber_id:    row.get(0)?,
      stream:           row.get(1)?,
      subject:          row.get(2)?,
      resource_ref:     row.get(3)?,
      purchased_at:     row.get(4)?,
      expires_at:       row.get(5)?,
      status:           row.get(6)?,
      last_reminded_at: row.get(7)?,
    })
  }

  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscriber_id:    SubscriberId(self.subscriber_id),
      product_id:       ProductId::new(self.stream, self.subject),
      resource_ref:     ResourceRef(self.resource_ref),
      purchased_at:     decode_dt(self.purchased_at)?,
      expires_at:       decode_dt(self.expires_at)?,
      status:           decode_status(&self.status)?,
      last_reminded_at: self.last_reminded_at.map(decode_dt).transpose()?,
    })
  }
}

/// Raw values for a row returned by the reminder query.
pub struct RawDueReminder {
  pub subscriber_id: i64,
  pub stream:        String,
  pub subject:       String,
  pub expires_at:    i64,
}

impl RawDueReminder {
  pub fn into_due(self) -> Result<DueReminder> {
    Ok(DueReminder {
      subscriber_id: SubscriberId(self.subscriber_id),
      product_id:    ProductId::new(self.stream, self.subject),
      expires_at:    decode_dt(self.expires_at)?,
    })
  }
}

/// Raw values for a row returned by the expiry query. Needs no fallible
/// decoding.
pub struct RawDueExpiration {
  pub subscriber_id: i64,
  pub stream:        String,
  pub subject:       String,
  pub resource_ref:  String,
}

impl From<RawDueExpiration> for DueExpiration {
  fn from(raw: RawDueExpiration) -> Self {
    DueExpiration {
      subscriber_id: SubscriberId(raw.subscriber_id),
      product_id:    ProductId::new(raw.stream, raw.subject),
      resource_ref:  ResourceRef(raw.resource_ref),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_text_matches_decoder() {
    for status in [SubscriptionStatus::Active, SubscriptionStatus::Expired] {
      let text = encode_status(status);
      assert_eq!(text, AsRef::<str>::as_ref(&status));
      assert_eq!(decode_status(text).unwrap(), status);
    }
    assert_eq!(encode_status(SubscriptionStatus::Expired), "expired");
  }

  #[test]
  fn unknown_status_text_is_rejected() {
    assert!(matches!(
      decode_status("paused"),
      Err(Error::Core(chanpass_core::Error::UnknownStatus(_)))
    ));
  }
}
