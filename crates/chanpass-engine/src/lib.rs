//! The subscription lifecycle engine.
//!
//! [`Engine`] applies purchases to a [`SubscriptionStore`] and drives the
//! reminder and expiry passes; [`Reconciler`] runs those passes on a timer.
//! Everything outside the store is reached through the collaborator traits in
//! [`chanpass_core::access`].
//!
//! [`SubscriptionStore`]: chanpass_core::store::SubscriptionStore

pub mod engine;
pub mod error;
pub mod intake;
pub mod messages;
pub mod reconciler;

pub use engine::{
  Engine, EngineConfig, GrantOutcome, PurchaseReceipt, ReconcileReport,
};
pub use error::{Error, Result};
pub use intake::{PaymentEvent, PurchaseCommand};
pub use reconciler::{Reconciler, ReconcilerHandle};
