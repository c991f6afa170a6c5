//! Bridge API types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Key material grouped by key type, then by key id.
pub type KeySnapshot = HashMap<String, HashMap<String, Value>>;

/// Key writes grouped by key type. A `None` value deletes the key.
pub type KeyUpdate = HashMap<String, HashMap<String, Option<Value>>>;

/// Client identity presented to the messaging network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub platform: String,
    pub browser: String,
    pub version: String,
}

impl BrowserProfile {
    /// A macOS desktop client running the given browser.
    pub fn macos(browser: impl Into<String>) -> Self {
        Self {
            platform: "Mac OS".into(),
            browser: browser.into(),
            version: "14.4.1".into(),
        }
    }

    /// Wire form: `[platform, browser, version]`.
    pub fn as_triple(&self) -> [&str; 3] {
        [&self.platform, &self.browser, &self.version]
    }
}

/// Request body for creating a bridge session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub creds: &'a Value,
    pub keys: &'a KeySnapshot,
    pub browser: [&'a str; 3],
    #[serde(rename = "markOnlineOnConnect")]
    pub mark_online_on_connect: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairingCodeRequest<'a> {
    #[serde(rename = "phoneNumber")]
    pub phone_number: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairingCodeResponse {
    pub code: Option<String>,
}

/// Outgoing message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text { text: String },
    Image { url: String, caption: Option<String> },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>, caption: impl Into<String>) -> Self {
        MessageContent::Image {
            url: url.into(),
            caption: Some(caption.into()),
        }
    }
}

/// Identifies a sent message, used for quoting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    #[serde(rename = "remoteJid")]
    pub remote_jid: String,
    pub id: String,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
}

/// Options for sending a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SendOptions {
    /// Message to reply to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted: Option<MessageKey>,
}

impl SendOptions {
    pub fn quoting(key: MessageKey) -> Self {
        Self { quoted: Some(key) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest<'a> {
    #[serde(rename = "messageId")]
    pub message_id: &'a str,
    pub to: &'a str,
    pub content: &'a MessageContent,
    #[serde(flatten)]
    pub options: &'a SendOptions,
}

/// Handle to a message accepted by the bridge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentMessage {
    pub key: MessageKey,
}

/// Event emitted by a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// Partial credential update; merge into the stored credentials.
    #[serde(rename = "creds.update")]
    CredsUpdate(Map<String, Value>),

    #[serde(rename = "keys.update")]
    KeysUpdate(KeyUpdate),

    #[serde(rename = "connection.update")]
    ConnectionUpdate(ConnectionUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    #[serde(default)]
    pub connection: Option<ConnectionState>,
    #[serde(rename = "lastDisconnect", default)]
    pub last_disconnect: Option<LastDisconnect>,
}

impl ConnectionUpdate {
    pub fn open() -> Self {
        Self {
            connection: Some(ConnectionState::Open),
            last_disconnect: None,
        }
    }

    pub fn closed(status_code: u16) -> Self {
        Self {
            connection: Some(ConnectionState::Close),
            last_disconnect: Some(LastDisconnect {
                status_code: Some(status_code),
                message: None,
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection == Some(ConnectionState::Open)
    }

    pub fn is_closed(&self) -> bool {
        self.connection == Some(ConnectionState::Close)
    }

    /// Decoded reason for a close, if the bridge reported a status code.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.last_disconnect
            .as_ref()
            .and_then(|d| d.status_code)
            .map(DisconnectReason::from_status_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastDisconnect {
    #[serde(rename = "statusCode", default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Why a transport connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    ConnectionClosed,
    /// Also reported on keep-alive timeouts.
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    UnavailableService,
    Unknown(u16),
}

impl DisconnectReason {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            428 => DisconnectReason::ConnectionClosed,
            408 => DisconnectReason::ConnectionLost,
            440 => DisconnectReason::ConnectionReplaced,
            401 => DisconnectReason::LoggedOut,
            500 => DisconnectReason::BadSession,
            515 => DisconnectReason::RestartRequired,
            411 => DisconnectReason::MultideviceMismatch,
            403 => DisconnectReason::Forbidden,
            503 => DisconnectReason::UnavailableService,
            other => DisconnectReason::Unknown(other),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionLost => 408,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::LoggedOut => 401,
            DisconnectReason::BadSession => 500,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::MultideviceMismatch => 411,
            DisconnectReason::Forbidden => 403,
            DisconnectReason::UnavailableService => 503,
            DisconnectReason::Unknown(code) => *code,
        }
    }
}
