//! Contracts for the external collaborators the lifecycle engine drives:
//! granting channel access, revoking it, and messaging the subscriber.
//!
//! Implementations live outside this crate (e.g. `chanpass-telegram`).

use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::subscription::{ResourceRef, SubscriberId};

/// Failure of a single collaborator call. Never fatal to the engine.
#[derive(Debug, Error)]
pub enum AccessError {
  /// The remote API answered and refused the request.
  #[error("{method} rejected: {description}")]
  Rejected {
    method:      &'static str,
    description: String,
  },

  /// The request never produced an answer.
  #[error("{method} transport error: {message}")]
  Transport {
    method:  &'static str,
    message: String,
  },

  #[error("call timed out after {0:?}")]
  Timeout(Duration),
}

/// A single-use invite link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteLink {
  pub url:        String,
  pub expires_at: DateTime<Utc>,
}

/// Adds a subscriber to a resource.
pub trait AccessGrant: Send + Sync {
  /// Approve a join request the subscriber already filed for `resource`.
  fn approve_join_request<'a>(
    &'a self,
    resource: &'a ResourceRef,
    subscriber: SubscriberId,
  ) -> impl Future<Output = Result<(), AccessError>> + Send + 'a;

  /// Issue an invite usable by one member, valid until `expires_at`.
  fn create_single_use_invite<'a>(
    &'a self,
    resource: &'a ResourceRef,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<InviteLink, AccessError>> + Send + 'a;
}

/// Removes a subscriber from a resource.
pub trait AccessRevoke: Send + Sync {
  fn ban<'a>(
    &'a self,
    resource: &'a ResourceRef,
    subscriber: SubscriberId,
  ) -> impl Future<Output = Result<(), AccessError>> + Send + 'a;

  /// Lift a ban so the subscriber may rejoin after a future renewal.
  fn unban<'a>(
    &'a self,
    resource: &'a ResourceRef,
    subscriber: SubscriberId,
  ) -> impl Future<Output = Result<(), AccessError>> + Send + 'a;
}

/// Sends a plain-text message to a subscriber.
pub trait Notifier: Send + Sync {
  fn send<'a>(
    &'a self,
    subscriber: SubscriberId,
    text: &'a str,
  ) -> impl Future<Output = Result<(), AccessError>> + Send + 'a;
}

/// Anything that can both grant and revoke access.
pub trait AccessProvider: AccessGrant + AccessRevoke {}

impl<T: AccessGrant + AccessRevoke> AccessProvider for T {}
