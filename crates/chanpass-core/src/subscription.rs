//! Subscription records and the inputs and outputs of a renewal.
//!
//! One row exists per (subscriber, product) pair. Rows are never deleted; a
//! renewal updates the row in place and the reconciler flips its status.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Stable messaging-platform user id of the paying user.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A purchasable offering, keyed by stream and subject (e.g. `"exam"`,
/// `"Module 10"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId {
  pub stream:  String,
  pub subject: String,
}

impl ProductId {
  pub fn new(stream: impl Into<String>, subject: impl Into<String>) -> Self {
    Self { stream: stream.into(), subject: subject.into() }
  }
}

impl fmt::Display for ProductId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.stream, self.subject)
  }
}

/// The external channel a product grants access to, e.g. `-1002222222222`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRef(pub String);

impl ResourceRef {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ResourceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// Whether the subscriber is expected to currently hold access.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
  Active,
  Expired,
}

/// The durable state of one (subscriber, product) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub subscriber_id:    SubscriberId,
  pub product_id:       ProductId,
  /// Denormalised at write time so revocation never consults the catalog.
  pub resource_ref:     ResourceRef,
  /// Time of the payment that last created or renewed this row.
  pub purchased_at:     DateTime<Utc>,
  pub expires_at:       DateTime<Utc>,
  pub status:           SubscriptionStatus,
  /// Set once a pre-expiry reminder went out for the current period.
  pub last_reminded_at: Option<DateTime<Utc>>,
}

impl Subscription {
  pub fn is_active(&self) -> bool {
    self.status == SubscriptionStatus::Active
  }
}

// ─── Renewal ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::SubscriptionStore::upsert_renewal`].
#[derive(Debug, Clone)]
pub struct Renewal {
  pub subscriber_id: SubscriberId,
  pub product_id:    ProductId,
  pub resource_ref:  ResourceRef,
  pub extension:     TimeDelta,
  /// Payment-provider id of the triggering payment. When present, a second
  /// renewal carrying the same id is recognised and not applied again.
  pub payment_id:    Option<String>,
}

/// How a renewal changed the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalKind {
  /// First payment for this pair.
  Created,
  /// Renewed before expiry; the remaining time was kept.
  Extended,
  /// Renewed after the previous period lapsed; restarted from the payment.
  Restarted,
  /// The payment id was already applied to this pair; nothing changed.
  Duplicate,
  /// The payment id was already applied to a different pair; nothing
  /// changed. `expires_at` is the requested pair's current expiry, or the
  /// renewal time when it has no row.
  Conflict,
}

/// Result of [`crate::store::SubscriptionStore::upsert_renewal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalOutcome {
  pub expires_at: DateTime<Utc>,
  pub kind:       RenewalKind,
}

/// Compute the expiry after a renewal at `now`.
///
/// Renewal extends from whichever is later, `now` or the prior expiry: early
/// renewals stack, lapsed ones restart from the payment moment.
pub fn renewed_expiry(
  current: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
  extension: TimeDelta,
) -> (DateTime<Utc>, RenewalKind) {
  match current {
    None => (now + extension, RenewalKind::Created),
    Some(prev) if prev > now => (prev + extension, RenewalKind::Extended),
    Some(_) => (now + extension, RenewalKind::Restarted),
  }
}

// ─── Reconcile query rows ────────────────────────────────────────────────────

/// A row due for a pre-expiry reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
  pub subscriber_id: SubscriberId,
  pub product_id:    ProductId,
  pub expires_at:    DateTime<Utc>,
}

/// An active row whose expiry has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueExpiration {
  pub subscriber_id: SubscriberId,
  pub product_id:    ProductId,
  pub resource_ref:  ResourceRef,
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use chrono::TimeZone;

  use super::*;

  fn at(days: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap() + TimeDelta::days(days)
  }

  #[test]
  fn first_purchase_starts_now() {
    let (exp, kind) = renewed_expiry(None, at(3), TimeDelta::days(30));
    assert_eq!(exp, at(33));
    assert_eq!(kind, RenewalKind::Created);
  }

  #[test]
  fn early_renewal_stacks_remaining_time() {
    let (exp, kind) = renewed_expiry(Some(at(30)), at(10), TimeDelta::days(30));
    assert_eq!(exp, at(60));
    assert_eq!(kind, RenewalKind::Extended);
  }

  #[test]
  fn lapsed_renewal_restarts_from_payment() {
    let (exp, kind) = renewed_expiry(Some(at(30)), at(45), TimeDelta::days(30));
    assert_eq!(exp, at(75));
    assert_eq!(kind, RenewalKind::Restarted);
  }

  #[test]
  fn renewal_exactly_at_expiry_restarts() {
    let (exp, kind) = renewed_expiry(Some(at(30)), at(30), TimeDelta::days(30));
    assert_eq!(exp, at(60));
    assert_eq!(kind, RenewalKind::Restarted);
  }

  #[test]
  fn back_to_back_early_renewals_are_additive() {
    let d = TimeDelta::days(30);
    let mut expiry = None;
    for (i, t) in [0, 5, 20, 40].into_iter().enumerate() {
      let (next, _) = renewed_expiry(expiry, at(t), d);
      expiry = Some(next);
      assert_eq!(next, at(0) + d * (i as i32 + 1));
    }
  }

  #[test]
  fn status_string_form() {
    assert_eq!(SubscriptionStatus::Active.as_ref(), "active");
    assert_eq!(
      SubscriptionStatus::from_str("expired").unwrap(),
      SubscriptionStatus::Expired
    );
    assert!(SubscriptionStatus::from_str("paused").is_err());
  }
}
