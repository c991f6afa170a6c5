//! Protocol bridge HTTP client.

use crate::engine::{Connection, LinkEngine, LinkSession, SessionConfig};
use crate::error::LinkError;
use crate::receiver::EventReceiver;
use crate::types::*;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use retry_cache::RetryCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use urlencoding::encode;
use uuid::Uuid;

/// Attempts per message before giving up.
pub const MAX_MSG_RETRY_COUNT: u32 = 5;

/// Client for the protocol bridge daemon.
#[derive(Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
    poll_interval: Duration,
    retry_backoff: Duration,
}

impl BridgeClient {
    /// Create a new bridge client.
    pub fn new(base_url: impl Into<String>, poll_interval: Duration) -> Result<Self, LinkError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            poll_interval,
            retry_backoff: Duration::from_millis(250),
        })
    }

    /// Base delay between message re-delivery attempts (multiplied by the attempt count).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Check if the bridge is healthy.
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/v1/health", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LinkEngine for BridgeClient {
    #[instrument(skip(self, config))]
    async fn connect(&self, config: SessionConfig) -> Result<Connection, LinkError> {
        let request = CreateSessionRequest {
            creds: &config.creds,
            keys: &config.keys,
            browser: config.browser.as_triple(),
            mark_online_on_connect: config.mark_online_on_connect,
        };

        let response = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .json(&request)
            .send()
            .await?;

        let created: CreateSessionResponse = check(response).await?.json().await?;
        info!(session_id = %created.id, "Bridge session created");

        let events = EventReceiver::new(
            self.client.clone(),
            self.base_url.clone(),
            created.id.clone(),
            self.poll_interval,
        )
        .stream();

        let session = BridgeSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            id: created.id,
            retry_cache: config.retry_cache,
            retry_backoff: self.retry_backoff,
        };

        Ok(Connection {
            session: Arc::new(session),
            events: Box::pin(events),
        })
    }
}

/// A session hosted by the bridge.
pub struct BridgeSession {
    client: Client,
    base_url: String,
    id: String,
    retry_cache: RetryCache,
    retry_backoff: Duration,
}

impl BridgeSession {
    fn url(&self, suffix: &str) -> String {
        format!("{}/v1/sessions/{}{}", self.base_url, encode(&self.id), suffix)
    }

    async fn try_send(
        &self,
        message_id: &str,
        to: &str,
        content: &MessageContent,
        options: &SendOptions,
    ) -> Result<SentMessage, LinkError> {
        let request = SendMessageRequest {
            message_id,
            to,
            content,
            options,
        };

        let response = self
            .client
            .post(self.url("/messages"))
            .json(&request)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl LinkSession for BridgeSession {
    fn id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, LinkError> {
        let response = self
            .client
            .post(self.url("/pairing-code"))
            .json(&PairingCodeRequest { phone_number })
            .send()
            .await?;

        let body: PairingCodeResponse = check(response).await?.json().await?;

        match body.code {
            Some(code) if !code.is_empty() => {
                debug!("Pairing code issued");
                Ok(code)
            }
            _ => Err(LinkError::Pairing("bridge returned no pairing code".into())),
        }
    }

    #[instrument(skip(self, content, options), fields(session_id = %self.id))]
    async fn send_message(
        &self,
        to: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, LinkError> {
        let message_id = Uuid::new_v4().simple().to_string().to_uppercase();

        loop {
            match self.try_send(&message_id, to, &content, &options).await {
                Ok(sent) => {
                    self.retry_cache.remove(&message_id).await;
                    debug!(message_id = %sent.key.id, "Message sent");
                    return Ok(sent);
                }
                Err(e) if e.is_transient() => {
                    let attempts = self.retry_cache.increment(&message_id).await;
                    if attempts >= MAX_MSG_RETRY_COUNT {
                        self.retry_cache.remove(&message_id).await;
                        warn!(%message_id, attempts, "Giving up on message: {}", e);
                        return Err(LinkError::SendFailed(format!(
                            "gave up after {} attempts: {}",
                            attempts, e
                        )));
                    }
                    warn!(%message_id, attempts, "Send failed, retrying: {}", e);
                    sleep(self.retry_backoff * attempts).await;
                }
                Err(e) => {
                    self.retry_cache.remove(&message_id).await;
                    return Err(e);
                }
            }
        }
    }

    #[instrument(skip(self), fields(session_id = %self.id))]
    async fn end(&self) -> Result<(), LinkError> {
        let response = self.client.delete(self.url("")).send().await?;

        match check(response).await {
            Ok(_) | Err(LinkError::SessionNotFound(_)) => {
                debug!("Session ended");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Map non-success responses to errors.
async fn check(response: Response) -> Result<Response, LinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(LinkError::SessionNotFound(body));
    }

    Err(LinkError::Api {
        status: status.as_u16(),
        body,
    })
}
