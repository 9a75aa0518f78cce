//! Broadcast fanout and the command surface around it.
//!
//! [`fanout::FanoutEngine`] copies one operator message to a snapshot of the
//! subscriber registry and evicts destinations that failed permanently.
//! [`service::BroadcastService`] wraps the registry and the engine behind the
//! authorization checks in [`access`].

pub mod access;
pub mod delivery;
pub mod error;
pub mod fanout;
pub mod service;

#[cfg(test)]
mod testing;

pub use {
    access::{AdminCheck, DenialReason, OperatorAllowlist},
    delivery::{BroadcastMessage, Deliver, DeliveryError, PermanentReason, TransientReason},
    error::{Error, Result},
    fanout::{BroadcastFailure, BroadcastReport, FanoutConfig, FanoutEngine},
    service::BroadcastService,
};
