//! `POST /webhooks/payment`: the payment provider's event callback.
//!
//! Only `payment.captured` is applied. The response tells the provider
//! whether to redeliver: any 2xx is final, 503 asks for a retry, and 400
//! means the request itself was not acceptable (bad signature or body).

use axum::{Json, extract::State, http::HeaderMap};
use bytes::Bytes;
use chanpass_core::{
  access::{AccessProvider, Notifier},
  clock::Clock,
  store::SubscriptionStore,
};
use chanpass_engine::{PaymentEvent, intake};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  AppState,
  error::Error,
  signature::{self, SIGNATURE_HEADER},
};

const CAPTURED: &str = "payment.captured";

// ─── Provider payload ────────────────────────────────────────────────────────

/// The envelope every event shares. `payload` differs per event type and is
/// only decoded once the type is known.
#[derive(Debug, Deserialize)]
struct ProviderEvent {
  event:   String,
  #[serde(default)]
  payload: Value,
}

#[derive(Debug, Deserialize)]
struct Payload {
  payment: PaymentWrapper,
}

#[derive(Debug, Deserialize)]
struct PaymentWrapper {
  entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
  id:     String,
  #[serde(default)]
  amount: i64,
  #[serde(default)]
  notes:  Notes,
}

/// Free-form key/value notes attached when the order was created. The
/// provider sends `[]` instead of `{}` when there are none.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Notes {
  user_id: Option<NoteValue>,
  name:    Option<String>,
  stream:  Option<String>,
  subject: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NoteValue {
  Number(i64),
  Text(String),
}

impl NoteValue {
  fn into_string(self) -> String {
    match self {
      NoteValue::Number(n) => n.to_string(),
      NoteValue::Text(s) => s,
    }
  }
}

impl From<PaymentEntity> for PaymentEvent {
  fn from(p: PaymentEntity) -> Self {
    PaymentEvent {
      payment_id:              Some(p.id),
      subscriber_id:           p.notes.user_id.map(NoteValue::into_string),
      subscriber_display_name: p.notes.name,
      stream:                  p.notes.stream,
      subject:                 p.notes.subject,
      amount_paid:             p.amount,
    }
  }
}

fn ignored(reason: impl std::fmt::Display) -> Json<Value> {
  Json(json!({ "ok": true, "ignored": true, "reason": reason.to_string() }))
}

// ─── Handler ─────────────────────────────────────────────────────────────────

pub async fn handler<S, A, N, C>(
  State(state): State<AppState<S, A, N, C>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<Value>, Error>
where
  S: SubscriptionStore + 'static,
  A: AccessProvider + 'static,
  N: Notifier + 'static,
  C: Clock + 'static,
{
  let provided = headers
    .get(SIGNATURE_HEADER)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::BadSignature)?;
  if let Err(e) = signature::verify(&state.webhook.secret, &body, provided) {
    tracing::warn!("rejected webhook with invalid signature");
    return Err(e);
  }

  let event: ProviderEvent = serde_json::from_slice(&body)
    .map_err(|e| Error::BadRequest(format!("malformed event: {e}")))?;

  if event.event != CAPTURED {
    tracing::debug!(event = %event.event, "ignoring webhook event");
    return Ok(ignored(format!("event {} not handled", event.event)));
  }
  let payload: Payload = serde_json::from_value(event.payload)
    .map_err(|e| Error::BadRequest(format!("malformed {CAPTURED} payload: {e}")))?;

  let payment = PaymentEvent::from(payload.payment.entity);
  let payment_id = payment.payment_id.clone().unwrap_or_default();

  let cmd = match intake::validate(payment, &state.webhook.default_stream) {
    Ok(cmd) => cmd,
    Err(e) => {
      tracing::warn!(payment = %payment_id, error = %e, "payment event not applicable");
      return Ok(ignored(e));
    }
  };

  match state.engine.purchase(cmd).await {
    Ok(receipt) => Ok(Json(json!({
      "ok":         true,
      "expires_at": receipt.expires_at,
      "renewal":    receipt.kind,
    }))),
    Err(e) if e.is_retryable() => {
      tracing::error!(payment = %payment_id, error = %e, "payment not recorded; asking for redelivery");
      Err(Error::Unavailable(e.to_string()))
    }
    Err(e) => {
      tracing::warn!(payment = %payment_id, error = %e, "payment acknowledged but not applied");
      Ok(ignored(e))
    }
  }
}
