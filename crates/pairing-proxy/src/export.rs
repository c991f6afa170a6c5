//! Credential export pipeline.
//!
//! Uploads the linked session's credential file, derives the public session
//! id from the upload link and delivers it to the account itself. Nothing in
//! here fails the lifecycle: an unusable upload degrades to a sentinel id.

use crate::config::Config;
use crate::upload::Uploader;
use link_client::{LinkSession, MessageContent, SendOptions};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Notification and id-derivation settings.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Confirmation text sent first
    pub message: String,
    /// Image attached to the id message
    pub image_url: String,
    /// Prefix of a derived session id
    pub prefix: String,
    /// URL prefix preceding the token in an upload link
    pub marker: String,
    /// Id reported when no usable link exists
    pub failure_sentinel: String,
}

impl ExportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            message: config.notify.message.clone(),
            image_url: config.notify.image_url.clone(),
            prefix: config.notify.prefix.clone(),
            marker: config.upload.marker.clone(),
            failure_sentinel: config.notify.failure_sentinel.clone(),
        }
    }
}

/// Public id of an exported session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentifier {
    /// Prefix plus the token taken from the upload link.
    Uploaded(String),
    /// The failure sentinel.
    Failed(String),
}

impl SessionIdentifier {
    pub fn as_str(&self) -> &str {
        match self {
            SessionIdentifier::Uploaded(id) | SessionIdentifier::Failed(id) => id,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, SessionIdentifier::Uploaded(_))
    }
}

impl fmt::Display for SessionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything after `marker` in `url`, prefixed. `None` if the marker is
/// absent or nothing follows it.
pub fn derive_session_id(url: &str, marker: &str, prefix: &str) -> Option<String> {
    url.split_once(marker)
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty())
        .map(|token| format!("{}{}", prefix, token))
}

/// Caption carrying the session id.
pub fn session_id_caption(id: &SessionIdentifier) -> String {
    format!("*Session ID*\n\n{}", id)
}

/// Runs the export for a freshly linked session.
pub struct CredentialExporter {
    uploader: Arc<dyn Uploader>,
    settings: ExportSettings,
}

impl CredentialExporter {
    pub fn new(uploader: Arc<dyn Uploader>, settings: ExportSettings) -> Self {
        Self { uploader, settings }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Upload the credential file and derive its session id.
    pub async fn export(&self, creds_path: &Path) -> SessionIdentifier {
        let url = match self.uploader.upload(creds_path).await {
            Ok(url) => url,
            Err(e) => {
                error!("Credential upload failed: {}", e);
                return SessionIdentifier::Failed(self.settings.failure_sentinel.clone());
            }
        };

        match derive_session_id(&url, &self.settings.marker, &self.settings.prefix) {
            Some(id) => {
                info!("Credential file uploaded");
                SessionIdentifier::Uploaded(id)
            }
            None => {
                warn!(%url, "Upload link does not contain the expected marker");
                SessionIdentifier::Failed(self.settings.failure_sentinel.clone())
            }
        }
    }

    /// Confirm the link, export the credentials and report the session id to
    /// `own_id`, quoting the confirmation.
    ///
    /// Send failures are logged; the returned id is whatever `export` produced.
    pub async fn run(
        &self,
        session: &dyn LinkSession,
        own_id: &str,
        creds_path: &Path,
    ) -> SessionIdentifier {
        let confirmation = match session
            .send_message(
                own_id,
                MessageContent::text(&self.settings.message),
                SendOptions::default(),
            )
            .await
        {
            Ok(sent) => Some(sent.key),
            Err(e) => {
                error!("Failed to send confirmation message: {}", e);
                None
            }
        };

        let session_id = self.export(creds_path).await;

        let options = confirmation
            .map(SendOptions::quoting)
            .unwrap_or_default();
        let content = MessageContent::image(&self.settings.image_url, session_id_caption(&session_id));

        match session.send_message(own_id, content, options).await {
            Ok(_) => info!(uploaded = session_id.is_uploaded(), "Session id delivered"),
            Err(e) => error!("Failed to deliver session id: {}", e),
        }

        session_id
    }
}
