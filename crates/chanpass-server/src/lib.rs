//! HTTP surface for chanpass.
//!
//! Exposes an axum [`Router`] with the payment-provider webhook and a health
//! check, backed by any [`Engine`].

pub mod error;
pub mod signature;
pub mod webhook;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post},
};
use chanpass_core::{
  access::{AccessProvider, Notifier},
  catalog::ProductConfig,
  clock::Clock,
  store::SubscriptionStore,
};
use chanpass_engine::{Engine, EngineConfig};
use chrono::TimeDelta;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `CHANPASS_*`
/// environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "defaults::host")]
  pub host:                    String,
  #[serde(default = "defaults::port")]
  pub port:                    u16,
  pub store_path:              PathBuf,
  /// Shared secret for webhook signatures.
  pub webhook_secret:          String,
  pub bot_token:               String,
  #[serde(default = "defaults::telegram_api_base")]
  pub telegram_api_base:       String,
  /// Shown to subscribers whenever something needs a human.
  pub support_contact:         String,
  /// Stream assumed for payments whose notes carry only a subject.
  #[serde(default = "defaults::stream")]
  pub default_stream:          String,
  #[serde(default = "defaults::reconcile_interval_secs")]
  pub reconcile_interval_secs: u64,
  #[serde(default = "defaults::reminder_lead_hours")]
  pub reminder_lead_hours:     i64,
  #[serde(default = "defaults::call_timeout_secs")]
  pub call_timeout_secs:       u64,
  #[serde(default)]
  pub products:                Vec<ProductConfig>,
}

mod defaults {
  pub fn host() -> String { "0.0.0.0".to_owned() }
  pub fn port() -> u16 { 5000 }
  pub fn telegram_api_base() -> String { "https://api.telegram.org".to_owned() }
  pub fn stream() -> String { "exam".to_owned() }
  pub fn reconcile_interval_secs() -> u64 { 30 * 60 }
  pub fn reminder_lead_hours() -> i64 { 48 }
  pub fn call_timeout_secs() -> u64 { 10 }
}

/// A configuration value outside the range the server can work with.
#[derive(Debug, thiserror::Error)]
#[error("{key} = {value} is out of range")]
pub struct InvalidConfig {
  pub key:   &'static str,
  pub value: i64,
}

impl ServerConfig {
  pub fn engine_config(&self) -> Result<EngineConfig, InvalidConfig> {
    let reminder_lead = TimeDelta::try_hours(self.reminder_lead_hours)
      .filter(|lead| *lead >= TimeDelta::zero())
      .ok_or(InvalidConfig {
        key:   "reminder_lead_hours",
        value: self.reminder_lead_hours,
      })?;
    Ok(EngineConfig {
      reminder_lead,
      call_timeout: self.call_timeout(),
      support_contact: self.support_contact.clone(),
    })
  }

  pub fn call_timeout(&self) -> Duration {
    Duration::from_secs(self.call_timeout_secs)
  }

  pub fn reconcile_interval(&self) -> Duration {
    Duration::from_secs(self.reconcile_interval_secs.max(1))
  }

  pub fn webhook_config(&self) -> WebhookConfig {
    WebhookConfig {
      secret:         self.webhook_secret.clone(),
      default_stream: self.default_stream.clone(),
    }
  }
}

/// What the webhook handler needs beyond the engine.
#[derive(Clone)]
pub struct WebhookConfig {
  pub secret:         String,
  pub default_stream: String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, A, N, C> {
  pub engine:  Arc<Engine<S, A, N, C>>,
  pub webhook: Arc<WebhookConfig>,
}

impl<S, A, N, C> Clone for AppState<S, A, N, C> {
  fn clone(&self) -> Self {
    Self {
      engine:  Arc::clone(&self.engine),
      webhook: Arc::clone(&self.webhook),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build an axum [`Router`] for the server.
pub fn router<S, A, N, C>(state: AppState<S, A, N, C>) -> Router
where
  S: SubscriptionStore + 'static,
  A: AccessProvider + 'static,
  N: Notifier + 'static,
  C: Clock + 'static,
{
  Router::new()
    .route("/healthz",          get(|| async { "ok" }))
    .route("/webhooks/payment", post(webhook::handler::<S, A, N, C>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
