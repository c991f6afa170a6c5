//! Credential file upload.

use crate::error::UploadError;
use async_trait::async_trait;
use reqwest::{multipart, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Uploads a file and returns its public URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

/// Multipart upload to an HTTP file host.
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, UploadError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.map(SecretString::new),
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let bytes = fs::read(path).await?;
        let fingerprint = hex::encode(Sha256::digest(&bytes));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "creds.json".into());

        info!(
            size = bytes.len(),
            sha256 = %&fingerprint[..16],
            "Uploading credential file"
        );

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/json")?;
        let form = multipart::Form::new().part("file", part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "File host rejected upload");
            return Err(UploadError::Rejected { status, body });
        }

        let body = response.text().await?;
        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|e| UploadError::Malformed(format!("{}: {}", e, body)))?;

        match parsed.url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(UploadError::Malformed("response has no url".into())),
        }
    }
}
