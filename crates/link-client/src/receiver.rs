//! Session event receiver with polling.

use crate::error::LinkError;
use crate::types::*;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tokio_stream::Stream;
use tracing::{debug, error};
use urlencoding::encode;

/// Backoff after a failed poll.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Polls the bridge for a session's events.
pub struct EventReceiver {
    client: Client,
    base_url: String,
    session_id: String,
    poll_interval: Duration,
}

impl EventReceiver {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session_id: session_id.into(),
            poll_interval,
        }
    }

    async fn poll(&self) -> Result<Vec<SessionEvent>, LinkError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/sessions/{}/events",
                self.base_url,
                encode(&self.session_id)
            ))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LinkError::SessionNotFound(self.session_id.clone()));
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    /// Events in bridge order as an async stream.
    ///
    /// Ends after a `close` connection update or once the bridge no longer
    /// knows the session.
    pub fn stream(self) -> impl Stream<Item = SessionEvent> {
        async_stream::stream! {
            loop {
                match self.poll().await {
                    Ok(events) => {
                        for event in events {
                            let closed = matches!(
                                &event,
                                SessionEvent::ConnectionUpdate(update) if update.is_closed()
                            );
                            yield event;
                            if closed {
                                debug!(session_id = %self.session_id, "Session closed, event stream ending");
                                return;
                            }
                        }
                    }
                    Err(LinkError::SessionNotFound(_)) => {
                        debug!(session_id = %self.session_id, "Session gone, event stream ending");
                        return;
                    }
                    Err(e) => {
                        error!(session_id = %self.session_id, "Event poll error: {}", e);
                        sleep(ERROR_BACKOFF).await;
                        continue;
                    }
                }

                sleep(self.poll_interval).await;
            }
        }
    }
}
