//! The `SubscriptionStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `chanpass-store-sqlite`). The lifecycle engine depends on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};

use crate::subscription::{
  DueExpiration, DueReminder, ProductId, Renewal, RenewalOutcome, SubscriberId,
  Subscription,
};

/// Durable keyed record of subscription state.
///
/// Every method receives the caller's notion of `now`; backends never read
/// the wall clock. Each call is atomic for the row it touches: no partial
/// write is ever observable, and a failing call leaves the store unchanged.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SubscriptionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Retrieve the row for a (subscriber, product) pair.
  fn get<'a>(
    &'a self,
    subscriber_id: SubscriberId,
    product_id: &'a ProductId,
  ) -> impl Future<Output = Result<Option<Subscription>, Self::Error>> + Send + 'a;

  /// All rows belonging to one subscriber, in product order.
  fn list_for_subscriber(
    &self,
    subscriber_id: SubscriberId,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + '_;

  /// Create or renew the row for `renewal`'s pair as one atomic
  /// read-modify-write.
  ///
  /// The new expiry is computed with
  /// [`renewed_expiry`](crate::subscription::renewed_expiry). The row is
  /// reset to active and its reminder marker is cleared.
  ///
  /// If `renewal.payment_id` was already applied nothing is written:
  /// [`RenewalKind::Duplicate`](crate::subscription::RenewalKind::Duplicate)
  /// is returned with the current expiry when it was applied to this pair,
  /// [`RenewalKind::Conflict`](crate::subscription::RenewalKind::Conflict)
  /// when it belongs to another one.
  fn upsert_renewal(
    &self,
    renewal: Renewal,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<RenewalOutcome, Self::Error>> + Send + '_;

  /// Active, not yet reminded rows with `now < expires_at <= now + lead`.
  fn list_due_reminders(
    &self,
    now: DateTime<Utc>,
    lead: TimeDelta,
  ) -> impl Future<Output = Result<Vec<DueReminder>, Self::Error>> + Send + '_;

  /// Record that the reminder for the current period went out.
  ///
  /// Idempotent: a row that is already marked keeps its first timestamp.
  fn mark_reminded<'a>(
    &'a self,
    subscriber_id: SubscriberId,
    product_id: &'a ProductId,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Active rows with `expires_at <= now`.
  fn list_expired(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DueExpiration>, Self::Error>> + Send + '_;

  /// Flip an active row whose expiry has passed to expired.
  ///
  /// Idempotent. A row renewed after it was listed (its `expires_at` is now
  /// later than `now`) is left active.
  fn mark_expired<'a>(
    &'a self,
    subscriber_id: SubscriberId,
    product_id: &'a ProductId,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
