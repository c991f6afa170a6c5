//! Session authentication state.
//!
//! Credentials and key material negotiated by the link engine, mirrored in
//! memory and persisted to the session directory on every change.

mod store;

pub use store::{AuthStore, CREDS_FILE};

use base64::{engine::general_purpose::STANDARD, Engine};
use link_client::KeySnapshot;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The account a session is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountIdentity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Session credentials, stored as the engine's JSON document.
///
/// Only the fields the coordinator reads are typed; everything else is
/// carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    /// Fresh credentials for a device that has never been linked.
    ///
    /// Curve key pairs are left to the engine, which generates them on first
    /// connect and reports them through a credential update.
    pub fn initial() -> Self {
        let mut rng = rand::thread_rng();
        let mut adv_secret = [0u8; 32];
        rng.fill_bytes(&mut adv_secret);

        let mut map = Map::new();
        map.insert("registrationId".into(), (rng.gen::<u16>() & 16383).into());
        map.insert("advSecretKey".into(), STANDARD.encode(adv_secret).into());
        map.insert("nextPreKeyId".into(), 1.into());
        map.insert("firstUnuploadedPreKeyId".into(), 1.into());
        map.insert("accountSyncCounter".into(), 0.into());
        map.insert("registered".into(), false.into());

        Self(map)
    }

    /// Whether the device has completed registration.
    pub fn registered(&self) -> bool {
        self.0
            .get("registered")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The linked account, once known.
    pub fn me(&self) -> Option<AccountIdentity> {
        self.0
            .get("me")
            .cloned()
            .and_then(|me| serde_json::from_value(me).ok())
    }

    /// Apply a partial update from the engine.
    pub fn merge(&mut self, update: Map<String, Value>) {
        for (key, value) in update {
            self.0.insert(key, value);
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Credentials {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Credentials plus key material for one session.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub creds: Credentials,
    pub keys: KeySnapshot,
}
