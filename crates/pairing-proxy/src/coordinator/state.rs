//! Lifecycle states and reconnect policy.

use link_client::DisconnectReason;
use serde::Serialize;

/// Where the coordinator is in a session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    PairingRequested,
    AwaitingLink,
    Open,
    Exporting,
    TornDown,
    Reconnecting,
    /// Closed for a reason that triggers no action; the session is kept
    /// until the next pairing request replaces it.
    Disconnected,
}

/// What to do after the transport closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Recoverable drop: start a fresh session from stored credentials.
    Reconnect,
    /// The device was unlinked: wait for the next pairing request.
    StayIdle,
    /// Log only.
    Ignore,
}

impl ReconnectDecision {
    pub fn for_reason(reason: Option<DisconnectReason>) -> Self {
        match reason {
            Some(
                DisconnectReason::ConnectionLost
                | DisconnectReason::ConnectionClosed
                | DisconnectReason::RestartRequired,
            ) => ReconnectDecision::Reconnect,
            Some(DisconnectReason::LoggedOut) => ReconnectDecision::StayIdle,
            _ => ReconnectDecision::Ignore,
        }
    }
}
