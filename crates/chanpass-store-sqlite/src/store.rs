//! [`SqliteStore`]: the SQLite implementation of [`SubscriptionStore`].

use std::path::Path;

use chanpass_core::{
  store::SubscriptionStore,
  subscription::{
    DueExpiration, DueReminder, ProductId, Renewal, RenewalKind, RenewalOutcome,
    SubscriberId, Subscription, SubscriptionStatus, renewed_expiry,
  },
};
use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use crate::{
  Error, Result,
  encode::{
    RawDueExpiration, RawDueReminder, RawSubscription, SUBSCRIPTION_COLUMNS,
    encode_dt, encode_status,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A subscription store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Decode a stored expiry inside a connection closure.
fn stored_expiry(ms: i64) -> tokio_rusqlite::Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ms)
    .ok_or_else(|| tokio_rusqlite::Error::Other(Box::new(Error::Timestamp(ms))))
}

// ─── SubscriptionStore impl ──────────────────────────────────────────────────

impl SubscriptionStore for SqliteStore {
  type Error = Error;

  async fn get(
    &self,
    subscriber_id: SubscriberId,
    product_id: &ProductId,
  ) -> Result<Option<Subscription>> {
    let stream  = product_id.stream.clone();
    let subject = product_id.subject.clone();

    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
               WHERE subscriber_id = ?1 AND stream = ?2 AND subject = ?3"
            ),
            rusqlite::params![subscriber_id.0, stream, subject],
            RawSubscription::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn list_for_subscriber(
    &self,
    subscriber_id: SubscriberId,
  ) -> Result<Vec<Subscription>> {
    let raws: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
           WHERE subscriber_id = ?1
           ORDER BY stream, subject"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subscriber_id.0], RawSubscription::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubscription::into_subscription).collect()
  }

  async fn upsert_renewal(
    &self,
    renewal: Renewal,
    now: DateTime<Utc>,
  ) -> Result<RenewalOutcome> {
    let Renewal { subscriber_id, product_id, resource_ref, extension, payment_id } =
      renewal;
    let ProductId { stream, subject } = product_id;
    let now_ms = encode_dt(now);

    let outcome = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front, so no other writer can
        // slip in between the read of the prior expiry and the update.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_ms: Option<i64> = tx
          .query_row(
            "SELECT expires_at FROM subscriptions
             WHERE subscriber_id = ?1 AND stream = ?2 AND subject = ?3",
            rusqlite::params![subscriber_id.0, stream, subject],
            |r| r.get(0),
          )
          .optional()?;

        if let Some(pid) = &payment_id {
          let owner: Option<(i64, String, String)> = tx
            .query_row(
              "SELECT subscriber_id, stream, subject FROM applied_payments
               WHERE payment_id = ?1",
              rusqlite::params![pid],
              |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;

          if let Some((owner_id, owner_stream, owner_subject)) = owner {
            let same_pair = owner_id == subscriber_id.0
              && owner_stream == stream
              && owner_subject == subject;
            let current = current_ms.map(stored_expiry).transpose()?;
            let outcome = match current {
              Some(expires_at) if same_pair => {
                RenewalOutcome { expires_at, kind: RenewalKind::Duplicate }
              }
              current => RenewalOutcome {
                expires_at: current.unwrap_or(now),
                kind:       RenewalKind::Conflict,
              },
            };
            return Ok(outcome);
          }
        }

        let current = current_ms.map(stored_expiry).transpose()?;
        let (expires_at, kind) = renewed_expiry(current, now, extension);

        tx.execute(
          "INSERT INTO subscriptions (
             subscriber_id, stream, subject, resource_ref,
             purchased_at, expires_at, status, last_reminded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)
           ON CONFLICT (subscriber_id, stream, subject) DO UPDATE SET
             resource_ref     = excluded.resource_ref,
             purchased_at     = excluded.purchased_at,
             expires_at       = excluded.expires_at,
             status           = excluded.status,
             last_reminded_at = NULL",
          rusqlite::params![
            subscriber_id.0,
            stream,
            subject,
            resource_ref.0,
            now_ms,
            encode_dt(expires_at),
            encode_status(SubscriptionStatus::Active),
          ],
        )?;

        if let Some(pid) = &payment_id {
          tx.execute(
            "INSERT INTO applied_payments
               (payment_id, subscriber_id, stream, subject, applied_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![pid, subscriber_id.0, stream, subject, now_ms],
          )?;
        }

        tx.commit()?;
        Ok(RenewalOutcome { expires_at, kind })
      })
      .await?;

    tracing::debug!(
      subscriber = %subscriber_id,
      expires_at = %outcome.expires_at,
      kind = ?outcome.kind,
      "renewal applied"
    );
    Ok(outcome)
  }

  async fn list_due_reminders(
    &self,
    now: DateTime<Utc>,
    lead: TimeDelta,
  ) -> Result<Vec<DueReminder>> {
    let now_ms     = encode_dt(now);
    let horizon_ms = encode_dt(now + lead);

    let raws: Vec<RawDueReminder> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT subscriber_id, stream, subject, expires_at
           FROM subscriptions
           WHERE status = ?1
             AND last_reminded_at IS NULL
             AND expires_at > ?2
             AND expires_at <= ?3
           ORDER BY expires_at",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              encode_status(SubscriptionStatus::Active),
              now_ms,
              horizon_ms,
            ],
            |row| {
              Ok(RawDueReminder {
                subscriber_id: row.get(0)?,
                stream:        row.get(1)?,
                subject:       row.get(2)?,
                expires_at:    row.get(3)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDueReminder::into_due).collect()
  }

  async fn mark_reminded(
    &self,
    subscriber_id: SubscriberId,
    product_id: &ProductId,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let stream  = product_id.stream.clone();
    let subject = product_id.subject.clone();
    let now_ms  = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE subscriptions SET last_reminded_at = ?4
           WHERE subscriber_id = ?1 AND stream = ?2 AND subject = ?3
             AND last_reminded_at IS NULL",
          rusqlite::params![subscriber_id.0, stream, subject, now_ms],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<DueExpiration>> {
    let now_ms = encode_dt(now);

    let raws: Vec<RawDueExpiration> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT subscriber_id, stream, subject, resource_ref
           FROM subscriptions
           WHERE status = ?1 AND expires_at <= ?2
           ORDER BY expires_at",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![encode_status(SubscriptionStatus::Active), now_ms],
            |row| {
              Ok(RawDueExpiration {
                subscriber_id: row.get(0)?,
                stream:        row.get(1)?,
                subject:       row.get(2)?,
                resource_ref:  row.get(3)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(raws.into_iter().map(DueExpiration::from).collect())
  }

  async fn mark_expired(
    &self,
    subscriber_id: SubscriberId,
    product_id: &ProductId,
    now: DateTime<Utc>,
  ) -> Result<()> {
    let stream  = product_id.stream.clone();
    let subject = product_id.subject.clone();
    let now_ms  = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE subscriptions SET status = ?4
           WHERE subscriber_id = ?1 AND stream = ?2 AND subject = ?3
             AND status = ?5 AND expires_at <= ?6",
          rusqlite::params![
            subscriber_id.0,
            stream,
            subject,
            encode_status(SubscriptionStatus::Expired),
            encode_status(SubscriptionStatus::Active),
            now_ms,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
