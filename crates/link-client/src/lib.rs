//! Client for the messaging protocol bridge.
//!
//! The bridge daemon runs the messaging protocol; this crate exposes its
//! sessions through the [`LinkEngine`] and [`LinkSession`] traits.

mod client;
mod engine;
mod error;
mod receiver;
mod types;

pub use client::{BridgeClient, BridgeSession, MAX_MSG_RETRY_COUNT};
pub use engine::{Connection, EventStream, LinkEngine, LinkSession, SessionConfig};
pub use error::LinkError;
pub use receiver::EventReceiver;
pub use types::*;
