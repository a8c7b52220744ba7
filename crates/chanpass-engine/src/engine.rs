//! [`Engine`]: the purchase and reconcile protocols.
//!
//! The engine keeps no state of its own. The store is the only source of
//! truth; collaborator calls are best-effort, bounded by
//! [`EngineConfig::call_timeout`], and never roll back a store write.

use std::{future::Future, sync::Arc, time::Duration};

use chanpass_core::{
  access::{AccessError, AccessProvider, InviteLink, Notifier},
  catalog::Catalog,
  clock::Clock,
  store::SubscriptionStore,
  subscription::{
    DueExpiration, DueReminder, Renewal, RenewalKind, ResourceRef, SubscriberId,
  },
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::{Error, Result, intake::PurchaseCommand, messages};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// How long before expiry the reminder goes out.
  pub reminder_lead:   TimeDelta,
  /// Upper bound on any single collaborator call.
  pub call_timeout:    Duration,
  /// Shown to subscribers when access could not be granted.
  pub support_contact: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      reminder_lead:   TimeDelta::days(2),
      call_timeout:    Duration::from_secs(10),
      support_contact: "support".to_owned(),
    }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Which grant path, if any, succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
  /// A pending join request was approved.
  Approved,
  /// A single-use invite was issued and sent to the subscriber.
  Invited(InviteLink),
  /// Both paths failed; the subscriber was told to contact support.
  Failed,
  /// The payment was a redelivery; access was granted the first time.
  Skipped,
}

#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
  pub expires_at: DateTime<Utc>,
  pub kind:       RenewalKind,
  pub grant:      GrantOutcome,
  /// Whether the confirmation message reached the subscriber.
  pub notified:   bool,
}

/// Counters for one reconcile tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
  pub reminded:          usize,
  pub reminder_failures: usize,
  pub expired:           usize,
  pub revoke_failures:   usize,
}

/// What the expiry pass did with one listed row.
enum Expiry {
  Revoked,
  RevokeFailed,
  Renewed,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S, A, N, C> {
  store:    S,
  access:   A,
  notifier: N,
  clock:    C,
  catalog:  Arc<Catalog>,
  config:   EngineConfig,
}

impl<S, A, N, C> Engine<S, A, N, C>
where
  S: SubscriptionStore,
  A: AccessProvider,
  N: Notifier,
  C: Clock,
{
  pub fn new(
    store: S,
    access: A,
    notifier: N,
    clock: C,
    catalog: Arc<Catalog>,
    config: EngineConfig,
  ) -> Self {
    Self { store, access, notifier, clock, catalog, config }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn catalog(&self) -> &Catalog { &self.catalog }

  pub fn config(&self) -> &EngineConfig { &self.config }

  // ── Purchase protocol ─────────────────────────────────────────────────────

  /// Apply one validated payment.
  ///
  /// Fails closed before the store write (nothing recorded, safe to retry)
  /// and open after it: grant and notification failures are reported in the
  /// receipt, never as an error. A payment id the store already applied to
  /// another subscription is refused with [`Error::PaymentConflict`].
  pub async fn purchase(&self, cmd: PurchaseCommand) -> Result<PurchaseReceipt> {
    let Some(product) = self
      .catalog
      .resolve(&cmd.product_id.stream, &cmd.product_id.subject)
    else {
      tracing::warn!(
        subscriber = %cmd.subscriber_id,
        product = %cmd.product_id,
        "payment for unknown product"
      );
      let text = messages::unmatched_payment(
        &cmd.product_id.subject,
        &self.config.support_contact,
      );
      if let Err(e) = self.notify(cmd.subscriber_id, &text).await {
        tracing::warn!(subscriber = %cmd.subscriber_id, error = %e, "apology not delivered");
      }
      return Err(Error::UnknownProduct {
        stream:  cmd.product_id.stream,
        subject: cmd.product_id.subject,
      });
    };

    if product.price > 0 && cmd.amount_paid != product.price {
      tracing::warn!(
        subscriber = %cmd.subscriber_id,
        product = %product.id,
        paid = cmd.amount_paid,
        price = product.price,
        "amount paid differs from catalog price; applying anyway"
      );
    }

    let now = self.clock.now();
    let outcome = self
      .store
      .upsert_renewal(
        Renewal {
          subscriber_id: cmd.subscriber_id,
          product_id:    product.id.clone(),
          resource_ref:  product.resource.clone(),
          extension:     product.extension,
          payment_id:    cmd.payment_id.clone(),
        },
        now,
      )
      .await
      .map_err(Error::store)?;

    if outcome.kind == RenewalKind::Conflict {
      let payment_id = cmd.payment_id.unwrap_or_default();
      tracing::warn!(
        subscriber = %cmd.subscriber_id,
        product = %product.id,
        payment = %payment_id,
        "payment id already applied to another subscription"
      );
      let text = messages::unmatched_payment(
        &product.id.subject,
        &self.config.support_contact,
      );
      if let Err(e) = self.notify(cmd.subscriber_id, &text).await {
        tracing::warn!(subscriber = %cmd.subscriber_id, error = %e, "apology not delivered");
      }
      return Err(Error::PaymentConflict { payment_id });
    }

    tracing::info!(
      subscriber = %cmd.subscriber_id,
      name = cmd.display_name.as_deref().unwrap_or(""),
      product = %product.id,
      expires_at = %outcome.expires_at,
      kind = ?outcome.kind,
      "purchase recorded"
    );

    let grant = if outcome.kind == RenewalKind::Duplicate {
      GrantOutcome::Skipped
    } else {
      self
        .grant(&product.resource, cmd.subscriber_id, outcome.expires_at)
        .await
    };

    let subject = &product.id.subject;
    let text = match &grant {
      GrantOutcome::Failed => messages::grant_failed(
        subject,
        outcome.expires_at,
        &self.config.support_contact,
      ),
      GrantOutcome::Invited(link) => {
        messages::purchase_confirmed(subject, outcome.kind, outcome.expires_at, Some(link))
      }
      GrantOutcome::Skipped if outcome.expires_at <= now => {
        messages::duplicate_after_expiry(subject, outcome.expires_at)
      }
      GrantOutcome::Approved | GrantOutcome::Skipped => {
        messages::purchase_confirmed(subject, outcome.kind, outcome.expires_at, None)
      }
    };

    let notified = match self.notify(cmd.subscriber_id, &text).await {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(
          subscriber = %cmd.subscriber_id,
          product = %product.id,
          error = %e,
          "purchase confirmation not delivered"
        );
        false
      }
    };

    Ok(PurchaseReceipt {
      expires_at: outcome.expires_at,
      kind: outcome.kind,
      grant,
      notified,
    })
  }

  /// Approve a pending join request, else issue a single-use invite that
  /// lapses with the subscription.
  async fn grant(
    &self,
    resource: &ResourceRef,
    subscriber: SubscriberId,
    expires_at: DateTime<Utc>,
  ) -> GrantOutcome {
    let approve_err = match self
      .bounded(self.access.approve_join_request(resource, subscriber))
      .await
    {
      Ok(()) => return GrantOutcome::Approved,
      Err(e) => e,
    };
    tracing::debug!(
      %subscriber, %resource, error = %approve_err,
      "no pending join request approved; issuing invite"
    );

    match self
      .bounded(self.access.create_single_use_invite(resource, expires_at))
      .await
    {
      Ok(link) => GrantOutcome::Invited(link),
      Err(e) => {
        tracing::error!(
          %subscriber, %resource, approve_error = %approve_err, invite_error = %e,
          "access grant failed"
        );
        GrantOutcome::Failed
      }
    }
  }

  // ── Reconcile protocol ────────────────────────────────────────────────────

  /// Run the reminder pass, then the expiry pass, against one snapshot of
  /// `now`.
  pub async fn reconcile(&self) -> Result<ReconcileReport> {
    let now = self.clock.now();
    let mut report = ReconcileReport::default();

    let due = self
      .store
      .list_due_reminders(now, self.config.reminder_lead)
      .await
      .map_err(Error::store)?;
    for row in due {
      if self.remind(&row, now).await? {
        report.reminded += 1;
      } else {
        report.reminder_failures += 1;
      }
    }

    let expired = self.store.list_expired(now).await.map_err(Error::store)?;
    for row in expired {
      match self.expire(&row, now).await? {
        Expiry::Revoked => report.expired += 1,
        Expiry::RevokeFailed => {
          report.expired += 1;
          report.revoke_failures += 1;
        }
        Expiry::Renewed => {}
      }
    }

    if report != ReconcileReport::default() {
      tracing::info!(
        reminded = report.reminded,
        reminder_failures = report.reminder_failures,
        expired = report.expired,
        revoke_failures = report.revoke_failures,
        "reconcile tick finished"
      );
    }
    Ok(report)
  }

  /// Returns whether the reminder was delivered (and therefore marked).
  async fn remind(&self, row: &DueReminder, now: DateTime<Utc>) -> Result<bool> {
    let text = messages::reminder(
      &row.product_id.subject,
      row.expires_at,
      row.expires_at - now,
    );

    match self.notify(row.subscriber_id, &text).await {
      Ok(()) => {
        self
          .store
          .mark_reminded(row.subscriber_id, &row.product_id, now)
          .await
          .map_err(Error::store)?;
        Ok(true)
      }
      Err(e) => {
        tracing::warn!(
          subscriber = %row.subscriber_id,
          product = %row.product_id,
          error = %e,
          "reminder not delivered; will retry next tick"
        );
        Ok(false)
      }
    }
  }

  /// Revoke and mark expired. The row is marked expired whether or not the
  /// revoke succeeded.
  async fn expire(&self, row: &DueExpiration, now: DateTime<Utc>) -> Result<Expiry> {
    // A purchase may have landed since the row was listed.
    let current = self
      .store
      .get(row.subscriber_id, &row.product_id)
      .await
      .map_err(Error::store)?;
    if current.is_some_and(|s| !s.is_active() || s.expires_at > now) {
      tracing::debug!(
        subscriber = %row.subscriber_id, product = %row.product_id,
        "renewed before revoke; skipping"
      );
      return Ok(Expiry::Renewed);
    }

    let revoked = match self.revoke(&row.resource_ref, row.subscriber_id).await {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(
          subscriber = %row.subscriber_id,
          product = %row.product_id,
          resource = %row.resource_ref,
          error = %e,
          "access revoke failed; marking expired anyway"
        );
        false
      }
    };

    self
      .store
      .mark_expired(row.subscriber_id, &row.product_id, now)
      .await
      .map_err(Error::store)?;

    tracing::info!(
      subscriber = %row.subscriber_id,
      product = %row.product_id,
      revoked,
      "subscription expired"
    );

    let text = messages::access_ended(&row.product_id.subject);
    if let Err(e) = self.notify(row.subscriber_id, &text).await {
      tracing::debug!(
        subscriber = %row.subscriber_id, error = %e,
        "expiry notice not delivered"
      );
    }
    Ok(if revoked { Expiry::Revoked } else { Expiry::RevokeFailed })
  }

  /// Ban evicts; the immediate unban lets the subscriber rejoin after a
  /// future renewal.
  async fn revoke(
    &self,
    resource: &ResourceRef,
    subscriber: SubscriberId,
  ) -> Result<(), AccessError> {
    self.bounded(self.access.ban(resource, subscriber)).await?;
    self.bounded(self.access.unban(resource, subscriber)).await
  }

  async fn notify(&self, subscriber: SubscriberId, text: &str) -> Result<(), AccessError> {
    self.bounded(self.notifier.send(subscriber, text)).await
  }

  async fn bounded<T>(
    &self,
    call: impl Future<Output = Result<T, AccessError>>,
  ) -> Result<T, AccessError> {
    let limit = self.config.call_timeout;
    tokio::time::timeout(limit, call)
      .await
      .unwrap_or(Err(AccessError::Timeout(limit)))
  }
}
