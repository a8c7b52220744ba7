//! Async HTTP client for the Telegram Bot API.

use std::time::Duration;

use chanpass_core::{
  access::{AccessError, AccessGrant, AccessRevoke, InviteLink, Notifier},
  subscription::{ResourceRef, SubscriberId},
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

use crate::{Error, Result};

/// Connection settings for the Bot API.
#[derive(Debug, Clone)]
pub struct BotConfig {
  pub token:    String,
  /// Defaults to `https://api.telegram.org`.
  pub api_base: String,
  pub timeout:  Duration,
}

impl BotConfig {
  pub fn new(token: impl Into<String>) -> Self {
    Self {
      token:    token.into(),
      api_base: "https://api.telegram.org".to_owned(),
      timeout:  Duration::from_secs(10),
    }
  }
}

/// Async client for the Bot API methods chanpass needs.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct BotClient {
  client: Client,
  config: BotConfig,
}

/// The envelope every Bot API method answers with, success or not.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
  ok:          bool,
  result:      Option<T>,
  description: Option<String>,
  error_code:  Option<i64>,
}

impl<T> Envelope<T> {
  fn into_result(self, method: &'static str) -> Result<T, AccessError> {
    match (self.ok, self.result) {
      (true, Some(result)) => Ok(result),
      (true, None) => Err(AccessError::Rejected {
        method,
        description: "ok response without result".to_owned(),
      }),
      (false, _) => Err(AccessError::Rejected {
        method,
        description: match (self.error_code, self.description) {
          (Some(code), Some(d)) => format!("{code}: {d}"),
          (None, Some(d)) => d,
          (Some(code), None) => code.to_string(),
          (None, None) => "no description".to_owned(),
        },
      }),
    }
  }
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
  invite_link: String,
}

impl BotClient {
  pub fn new(config: BotConfig) -> Result<Self> {
    if config.token.trim().is_empty() {
      return Err(Error::MissingToken);
    }
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, method: &str) -> String {
    format!(
      "{}/bot{}/{}",
      self.config.api_base.trim_end_matches('/'),
      self.config.token,
      method
    )
  }

  async fn call<T: DeserializeOwned>(
    &self,
    method: &'static str,
    body: serde_json::Value,
  ) -> Result<T, AccessError> {
    // `without_url` keeps the bot token out of error messages.
    let transport = |e: reqwest::Error| AccessError::Transport {
      method,
      message: e.without_url().to_string(),
    };

    let resp = self
      .client
      .post(self.url(method))
      .json(&body)
      .send()
      .await
      .map_err(transport)?;

    let status = resp.status();
    let envelope: Envelope<T> = resp.json().await.map_err(transport)?;
    let result = envelope.into_result(method);
    if let Err(e) = &result {
      tracing::debug!(method, %status, error = %e, "bot api call failed");
    }
    result
  }

  /// `sendMessage` with arbitrary text; exposed for operational use.
  pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), AccessError> {
    self
      .call::<serde_json::Value>("sendMessage", json!({ "chat_id": chat_id, "text": text }))
      .await
      .map(|_| ())
  }
}

// ─── Collaborator impls ──────────────────────────────────────────────────────

impl AccessGrant for BotClient {
  async fn approve_join_request(
    &self,
    resource: &ResourceRef,
    subscriber: SubscriberId,
  ) -> Result<(), AccessError> {
    self
      .call::<bool>(
        "approveChatJoinRequest",
        json!({ "chat_id": resource.as_str(), "user_id": subscriber.0 }),
      )
      .await
      .map(|_| ())
  }

  async fn create_single_use_invite(
    &self,
    resource: &ResourceRef,
    expires_at: DateTime<Utc>,
  ) -> Result<InviteLink, AccessError> {
    let link: ChatInviteLink = self
      .call(
        "createChatInviteLink",
        json!({
          "chat_id":      resource.as_str(),
          "member_limit": 1,
          "expire_date":  expires_at.timestamp(),
        }),
      )
      .await?;
    Ok(InviteLink { url: link.invite_link, expires_at })
  }
}

impl AccessRevoke for BotClient {
  async fn ban(
    &self,
    resource: &ResourceRef,
    subscriber: SubscriberId,
  ) -> Result<(), AccessError> {
    self
      .call::<bool>(
        "banChatMember",
        json!({ "chat_id": resource.as_str(), "user_id": subscriber.0 }),
      )
      .await
      .map(|_| ())
  }

  async fn unban(
    &self,
    resource: &ResourceRef,
    subscriber: SubscriberId,
  ) -> Result<(), AccessError> {
    self
      .call::<bool>(
        "unbanChatMember",
        json!({
          "chat_id":        resource.as_str(),
          "user_id":        subscriber.0,
          "only_if_banned": true,
        }),
      )
      .await
      .map(|_| ())
  }
}

impl Notifier for BotClient {
  async fn send(&self, subscriber: SubscriberId, text: &str) -> Result<(), AccessError> {
    self.send_message(subscriber.0, text).await
  }
}
