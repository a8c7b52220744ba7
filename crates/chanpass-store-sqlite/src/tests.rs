//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chanpass_core::{
  store::SubscriptionStore,
  subscription::{
    ProductId, Renewal, RenewalKind, ResourceRef, SubscriberId,
    SubscriptionStatus,
  },
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() }

fn day(n: i64) -> DateTime<Utc> { t0() + TimeDelta::days(n) }

const ALICE: SubscriberId = SubscriberId(1001);
const BOB: SubscriberId = SubscriberId(1002);

fn module_10() -> ProductId { ProductId::new("exam", "Module 10") }

fn renewal(subscriber: SubscriberId, payment_id: Option<&str>) -> Renewal {
  Renewal {
    subscriber_id: subscriber,
    product_id:    module_10(),
    resource_ref:  ResourceRef("-1002222222222".into()),
    extension:     TimeDelta::days(30),
    payment_id:    payment_id.map(str::to_owned),
  }
}

// ─── Renewal ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_renewal_creates_active_row() {
  let s = store().await;

  let out = s.upsert_renewal(renewal(ALICE, None), t0()).await.unwrap();
  assert_eq!(out.kind, RenewalKind::Created);
  assert_eq!(out.expires_at, day(30));

  let row = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(row.status, SubscriptionStatus::Active);
  assert_eq!(row.purchased_at, t0());
  assert_eq!(row.expires_at, day(30));
  assert_eq!(row.resource_ref, ResourceRef("-1002222222222".into()));
  assert!(row.last_reminded_at.is_none());
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(ALICE, &module_10()).await.unwrap().is_none());
}

#[tokio::test]
async fn early_renewals_stack() {
  let s = store().await;

  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  let second = s.upsert_renewal(renewal(ALICE, None), day(10)).await.unwrap();
  let third = s.upsert_renewal(renewal(ALICE, None), day(50)).await.unwrap();

  assert_eq!(second.kind, RenewalKind::Extended);
  assert_eq!(second.expires_at, day(60));
  assert_eq!(third.expires_at, day(90));

  let rows = s.list_for_subscriber(ALICE).await.unwrap();
  assert_eq!(rows.len(), 1, "renewal must update in place");
}

#[tokio::test]
async fn lapsed_renewal_restarts_from_payment() {
  let s = store().await;

  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  let out = s.upsert_renewal(renewal(ALICE, None), day(100)).await.unwrap();

  assert_eq!(out.kind, RenewalKind::Restarted);
  assert_eq!(out.expires_at, day(130));
}

#[tokio::test]
async fn renewal_resets_status_and_reminder() {
  let s = store().await;

  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  s.mark_reminded(ALICE, &module_10(), day(28)).await.unwrap();
  s.mark_expired(ALICE, &module_10(), day(31)).await.unwrap();

  let expired = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(expired.status, SubscriptionStatus::Expired);
  assert_eq!(expired.last_reminded_at, Some(day(28)));

  s.upsert_renewal(renewal(ALICE, None), day(32)).await.unwrap();
  let renewed = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(renewed.status, SubscriptionStatus::Active);
  assert_eq!(renewed.expires_at, day(62));
  assert!(renewed.last_reminded_at.is_none());
}

#[tokio::test]
async fn renewal_refreshes_resource_ref() {
  let s = store().await;

  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  let mut moved = renewal(ALICE, None);
  moved.resource_ref = ResourceRef("-1009999999999".into());
  s.upsert_renewal(moved, day(1)).await.unwrap();

  let row = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(row.resource_ref, ResourceRef("-1009999999999".into()));
}

#[tokio::test]
async fn duplicate_payment_id_is_not_applied_twice() {
  let s = store().await;

  let first = s
    .upsert_renewal(renewal(ALICE, Some("pay_1")), day(0))
    .await
    .unwrap();
  let again = s
    .upsert_renewal(renewal(ALICE, Some("pay_1")), day(1))
    .await
    .unwrap();

  assert_eq!(again.kind, RenewalKind::Duplicate);
  assert_eq!(again.expires_at, first.expires_at);

  let next = s
    .upsert_renewal(renewal(ALICE, Some("pay_2")), day(2))
    .await
    .unwrap();
  assert_eq!(next.kind, RenewalKind::Extended);
  assert_eq!(next.expires_at, day(60));
}

#[tokio::test]
async fn payment_id_reused_for_another_pair_is_a_conflict() {
  let s = store().await;
  s.upsert_renewal(renewal(ALICE, Some("pay_x")), day(0)).await.unwrap();

  // Bob has no row yet.
  let out = s
    .upsert_renewal(renewal(BOB, Some("pay_x")), day(1))
    .await
    .unwrap();
  assert_eq!(out.kind, RenewalKind::Conflict);
  assert!(s.get(BOB, &module_10()).await.unwrap().is_none());

  // Bob has a row of his own; it is left as it was.
  s.upsert_renewal(renewal(BOB, Some("pay_b")), day(1)).await.unwrap();
  let out = s
    .upsert_renewal(renewal(BOB, Some("pay_x")), day(2))
    .await
    .unwrap();
  assert_eq!(out.kind, RenewalKind::Conflict);
  assert_eq!(out.expires_at, day(31));

  // Same subscriber, different product.
  let mut other = renewal(ALICE, Some("pay_x"));
  other.product_id = ProductId::new("exam", "All 4 in 1");
  let out = s.upsert_renewal(other, day(2)).await.unwrap();
  assert_eq!(out.kind, RenewalKind::Conflict);
  assert!(
    s.get(ALICE, &ProductId::new("exam", "All 4 in 1"))
      .await
      .unwrap()
      .is_none()
  );

  let alice = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(alice.expires_at, day(30));
}

#[tokio::test]
async fn concurrent_renewals_do_not_lose_updates() {
  let s = Arc::new(store().await);
  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();

  let mut tasks = Vec::new();
  for _ in 0..8 {
    let s = Arc::clone(&s);
    tasks.push(tokio::spawn(async move {
      s.upsert_renewal(renewal(ALICE, None), day(1)).await.unwrap()
    }));
  }
  for task in tasks {
    task.await.unwrap();
  }

  let row = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(row.expires_at, day(30 * 9));
}

// ─── Reminders ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn due_reminders_respect_lead_window() {
  let s = store().await;
  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  let lead = TimeDelta::days(2);

  assert!(s.list_due_reminders(day(27), lead).await.unwrap().is_empty());

  let due = s.list_due_reminders(day(28), lead).await.unwrap();
  assert_eq!(due.len(), 1);
  assert_eq!(due[0].subscriber_id, ALICE);
  assert_eq!(due[0].product_id, module_10());
  assert_eq!(due[0].expires_at, day(30));

  // Already expired rows are not reminded.
  assert!(s.list_due_reminders(day(30), lead).await.unwrap().is_empty());
}

#[tokio::test]
async fn mark_reminded_excludes_row_until_renewal() {
  let s = store().await;
  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  let lead = TimeDelta::days(2);

  s.mark_reminded(ALICE, &module_10(), day(28)).await.unwrap();
  s.mark_reminded(ALICE, &module_10(), day(29)).await.unwrap();
  assert!(s.list_due_reminders(day(29), lead).await.unwrap().is_empty());

  let row = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(row.last_reminded_at, Some(day(28)), "first mark wins");

  // Early renewal clears the marker; the new period is eligible again.
  s.upsert_renewal(renewal(ALICE, None), day(29)).await.unwrap();
  assert!(s.list_due_reminders(day(29), lead).await.unwrap().is_empty());
  assert_eq!(s.list_due_reminders(day(58), lead).await.unwrap().len(), 1);
}

// ─── Expiry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_expired_includes_only_active_lapsed_rows() {
  let s = store().await;
  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();
  s.upsert_renewal(renewal(BOB, None), day(10)).await.unwrap();

  assert!(s.list_expired(day(29)).await.unwrap().is_empty());

  let expired = s.list_expired(day(30)).await.unwrap();
  assert_eq!(expired.len(), 1);
  assert_eq!(expired[0].subscriber_id, ALICE);
  assert_eq!(expired[0].resource_ref, ResourceRef("-1002222222222".into()));

  assert_eq!(s.list_expired(day(45)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn mark_expired_is_final_for_the_period() {
  let s = store().await;
  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();

  s.mark_expired(ALICE, &module_10(), day(31)).await.unwrap();
  s.mark_expired(ALICE, &module_10(), day(31)).await.unwrap();

  assert!(s.list_expired(day(31)).await.unwrap().is_empty());
  assert!(
    s.list_due_reminders(day(29), TimeDelta::days(2))
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn mark_expired_skips_row_renewed_after_listing() {
  let s = store().await;
  s.upsert_renewal(renewal(ALICE, None), day(0)).await.unwrap();

  let listed = s.list_expired(day(31)).await.unwrap();
  assert_eq!(listed.len(), 1);

  s.upsert_renewal(renewal(ALICE, None), day(31)).await.unwrap();
  s.mark_expired(ALICE, &module_10(), day(31)).await.unwrap();

  let row = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(row.status, SubscriptionStatus::Active);
  assert_eq!(row.expires_at, day(61));
}

#[tokio::test]
async fn rows_survive_reopen() {
  let dir = std::env::temp_dir().join(format!(
    "chanpass-store-{}-{}",
    std::process::id(),
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
  ));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("subs.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.upsert_renewal(renewal(ALICE, Some("pay_1")), day(0)).await.unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let row = s.get(ALICE, &module_10()).await.unwrap().unwrap();
  assert_eq!(row.expires_at, day(30));
  let dup = s
    .upsert_renewal(renewal(ALICE, Some("pay_1")), day(1))
    .await
    .unwrap();
  assert_eq!(dup.kind, RenewalKind::Duplicate);

  drop(s);
  let _ = std::fs::remove_dir_all(&dir);
}
