//! [`Reconciler`] runs [`Engine::reconcile`] on a fixed interval.
//!
//! A single task owns the loop and awaits each tick before waiting for the
//! next, so ticks never overlap. Ticks missed while one was running are
//! skipped rather than replayed back to back.

use std::{sync::Arc, time::Duration};

use chanpass_core::{
  access::{AccessProvider, Notifier},
  clock::Clock,
  store::SubscriptionStore,
};
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::MissedTickBehavior,
};

use crate::Engine;

pub struct Reconciler;

impl Reconciler {
  /// Spawn the loop on the current tokio runtime. The first tick runs
  /// immediately.
  pub fn spawn<S, A, N, C>(
    engine: Arc<Engine<S, A, N, C>>,
    every: Duration,
  ) -> ReconcilerHandle
  where
    S: SubscriptionStore + 'static,
    A: AccessProvider + 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
  {
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      tracing::info!(interval = ?every, "reconciler started");

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if let Err(e) = engine.reconcile().await {
              tracing::error!(error = %e, "reconcile tick failed");
            }
          }
          _ = stop.changed() => break,
        }
      }
      tracing::info!("reconciler stopped");
    });

    ReconcilerHandle { shutdown, task }
  }
}

/// Owns the reconciler task. Dropping the handle also stops the loop once
/// the tick in progress completes.
pub struct ReconcilerHandle {
  shutdown: watch::Sender<bool>,
  task:     JoinHandle<()>,
}

impl ReconcilerHandle {
  /// Stop after the tick in progress (if any) completes.
  pub async fn shutdown(self) {
    let _ = self.shutdown.send(true);
    if let Err(e) = self.task.await {
      tracing::error!(error = %e, "reconciler task panicked");
    }
  }
}
