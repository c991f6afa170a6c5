//! Protocol engine abstraction.
//!
//! The messaging protocol itself (transport, encryption, multi-device state)
//! lives behind these traits. The coordinator only drives sessions through
//! them and consumes their event streams.

use crate::error::LinkError;
use crate::types::*;
use async_trait::async_trait;
use futures::Stream;
use retry_cache::RetryCache;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;

/// Ordered stream of events for one session.
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Everything the engine needs to open a session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Stored credentials (the full `creds.json` document).
    pub creds: Value,
    /// Stored key material.
    pub keys: KeySnapshot,
    pub browser: BrowserProfile,
    pub mark_online_on_connect: bool,
    /// Shared message retry counters.
    pub retry_cache: RetryCache,
}

/// A freshly opened session and its event stream.
pub struct Connection {
    pub session: Arc<dyn LinkSession>,
    pub events: EventStream,
}

/// Opens protocol sessions.
#[async_trait]
pub trait LinkEngine: Send + Sync {
    async fn connect(&self, config: SessionConfig) -> Result<Connection, LinkError>;
}

/// A live protocol session.
#[async_trait]
pub trait LinkSession: Send + Sync {
    /// Engine-assigned session id.
    fn id(&self) -> &str;

    /// Ask the network for a pairing code for `phone_number` (digits only).
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, LinkError>;

    /// Send a message from the linked account.
    async fn send_message(
        &self,
        to: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, LinkError>;

    /// Close the transport. Ending an already-closed session is not an error.
    async fn end(&self) -> Result<(), LinkError>;
}
