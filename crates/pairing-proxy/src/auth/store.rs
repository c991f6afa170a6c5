//! Multi-file auth state persistence.

use super::{AuthState, Credentials};
use crate::error::ProxyError;
use link_client::KeyUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};
use urlencoding::encode;

/// Credentials file inside the session directory.
pub const CREDS_FILE: &str = "creds.json";

/// One stored key entry.
#[derive(Debug, Serialize, Deserialize)]
struct KeyRecord {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    value: Value,
}

/// Auth state stored as a directory of JSON files.
///
/// `creds.json` holds the credentials; every key entry gets its own file.
#[derive(Debug, Clone)]
pub struct AuthStore {
    dir: PathBuf,
}

impl AuthStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the credentials file.
    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// Create the session directory if it is missing.
    pub async fn ensure_dir(&self) -> Result<(), ProxyError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Load stored auth state, initializing fresh credentials if none exist.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn load(&self) -> Result<AuthState, ProxyError> {
        self.ensure_dir().await?;

        let creds = match fs::read(self.creds_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No stored credentials, initializing");
                let creds = Credentials::initial();
                self.save_creds(&creds).await?;
                creds
            }
            Err(e) => return Err(e.into()),
        };

        let mut state = AuthState {
            creds,
            keys: Default::default(),
        };

        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == CREDS_FILE || !name.ends_with(".json") {
                continue;
            }

            let bytes = fs::read(entry.path()).await?;
            match serde_json::from_slice::<KeyRecord>(&bytes) {
                Ok(record) => {
                    state
                        .keys
                        .entry(record.kind)
                        .or_default()
                        .insert(record.id, record.value);
                }
                Err(e) => warn!(file = %name, "Skipping unreadable key file: {}", e),
            }
        }

        debug!(
            registered = state.creds.registered(),
            key_types = state.keys.len(),
            "Auth state loaded"
        );
        Ok(state)
    }

    /// Persist the full credentials document.
    ///
    /// Written to a temporary file and renamed, so readers never see a
    /// partially written `creds.json`.
    pub async fn save_creds(&self, creds: &Credentials) -> Result<(), ProxyError> {
        let json = serde_json::to_vec_pretty(creds)?;
        let tmp = self.dir.join(format!("{}.tmp", CREDS_FILE));

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, self.creds_path()).await?;

        debug!("Credentials saved");
        Ok(())
    }

    /// Write or delete key entries and mirror the change in memory.
    pub async fn apply_key_update(
        &self,
        state: &mut AuthState,
        update: KeyUpdate,
    ) -> Result<(), ProxyError> {
        for (kind, entries) in update {
            for (id, value) in entries {
                let path = self.dir.join(key_file_name(&kind, &id));
                match value {
                    Some(value) => {
                        let record = KeyRecord {
                            kind: kind.clone(),
                            id: id.clone(),
                            value,
                        };
                        fs::write(&path, serde_json::to_vec(&record)?).await?;
                        state
                            .keys
                            .entry(kind.clone())
                            .or_default()
                            .insert(id, record.value);
                    }
                    None => {
                        match fs::remove_file(&path).await {
                            Ok(()) => {}
                            Err(e) if e.kind() == ErrorKind::NotFound => {}
                            Err(e) => return Err(e.into()),
                        }
                        if let Some(by_id) = state.keys.get_mut(&kind) {
                            by_id.remove(&id);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Remove the session directory and everything in it.
    pub async fn wipe(&self) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// File name for a key entry, safe on every filesystem.
///
/// Both parts are percent-encoded, so the `+` separator never occurs inside
/// either and distinct entries never share a file.
fn key_file_name(kind: &str, id: &str) -> String {
    format!("{}+{}.json", encode(kind), encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> AuthStore {
        AuthStore::new(dir.path().join("session"))
    }

    #[test]
    fn test_key_file_name() {
        assert_eq!(key_file_name("pre-key", "1"), "pre-key+1.json");
        assert_eq!(
            key_file_name("session", "155512:3@s.whatsapp.net"),
            "session+155512%3A3%40s.whatsapp.net.json"
        );
        assert_eq!(key_file_name("sender-key", "a/b"), "sender-key+a%2Fb.json");
    }

    #[test]
    fn test_key_file_names_never_collide() {
        assert_ne!(key_file_name("pre-key", "1"), key_file_name("pre", "key-1"));
        assert_ne!(key_file_name("a", "b+c"), key_file_name("a+b", "c"));
        assert_ne!(key_file_name("session", "a:b"), key_file_name("session", "a-b"));
        assert_ne!(key_file_name("session", "a/b"), key_file_name("session", "a__b"));
    }

    #[tokio::test]
    async fn test_similar_keys_kept_apart() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let mut state = store.load().await.unwrap();

        let mut update: KeyUpdate = HashMap::new();
        update.insert(
            "pre-key".into(),
            HashMap::from([("1".to_string(), Some(serde_json::json!("first")))]),
        );
        update.insert(
            "pre".into(),
            HashMap::from([("key-1".to_string(), Some(serde_json::json!("second")))]),
        );
        store.apply_key_update(&mut state, update).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.keys["pre-key"]["1"], "first");
        assert_eq!(reloaded.keys["pre"]["key-1"], "second");
    }

    #[tokio::test]
    async fn test_load_initializes_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let state = store.load().await.unwrap();

        assert!(!state.creds.registered());
        assert!(state.keys.is_empty());
        assert!(store.creds_path().exists());
    }

    #[tokio::test]
    async fn test_save_and_reload_credentials() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let mut state = store.load().await.unwrap();

        let update = serde_json::json!({ "registered": true, "me": { "id": "1555@s.whatsapp.net" } });
        state.creds.merge(update.as_object().unwrap().clone());
        store.save_creds(&state.creds).await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert!(reloaded.creds.registered());
        assert_eq!(reloaded.creds.me().unwrap().id, "1555@s.whatsapp.net");
        assert!(!store.dir().join("creds.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_key_updates_round_trip_through_disk() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        let mut state = store.load().await.unwrap();

        let mut pre_keys = HashMap::new();
        pre_keys.insert("1".to_string(), Some(serde_json::json!({ "public": "abc" })));
        pre_keys.insert("2".to_string(), Some(serde_json::json!({ "public": "def" })));
        let mut update = HashMap::new();
        update.insert("pre-key".to_string(), pre_keys);
        store.apply_key_update(&mut state, update).await.unwrap();

        let mut delete = HashMap::new();
        delete.insert("2".to_string(), None);
        let mut update = HashMap::new();
        update.insert("pre-key".to_string(), delete);
        store.apply_key_update(&mut state, update).await.unwrap();

        assert_eq!(state.keys["pre-key"].len(), 1);

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.keys["pre-key"].len(), 1);
        assert_eq!(reloaded.keys["pre-key"]["1"]["public"], "abc");
    }

    #[tokio::test]
    async fn test_wipe_removes_directory() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        store.load().await.unwrap();

        store.wipe().await.unwrap();
        assert!(!store.dir().exists());

        // Wiping twice is fine
        store.wipe().await.unwrap();
    }
}
