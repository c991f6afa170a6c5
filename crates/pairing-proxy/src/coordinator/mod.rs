//! Connection lifecycle coordinator.
//!
//! Owns the single live protocol session and drives it from pairing through
//! export to teardown. Session events are forwarded into one mailbox and
//! handled by a single task, in arrival order. The open sequence (settle,
//! export, teardown) runs in its own task so credential and key updates keep
//! landing on disk while it waits.

mod state;

pub use state::{LifecycleState, ReconnectDecision};

use crate::auth::{AuthState, AuthStore};
use crate::config::Config;
use crate::error::{ProxyError, TeardownError};
use crate::export::CredentialExporter;
use crate::pairing::{format_pairing_code, PairingRequest};
use link_client::{
    BrowserProfile, Connection, DisconnectReason, EventStream, LinkEngine, LinkSession,
    SessionConfig, SessionEvent,
};
use retry_cache::RetryCache;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument, warn};

/// Session setup and timing settings.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub browser: BrowserProfile,
    pub mark_online_on_connect: bool,
    /// Transport settle time before requesting a pairing code
    pub pairing_grace: Duration,
    /// Link propagation time before exporting
    pub open_settle: Duration,
    /// Delivery time for the notifications before teardown
    pub teardown_delay: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser: BrowserProfile::macos(config.link.browser.clone()),
            mark_online_on_connect: config.link.mark_online,
            pairing_grace: config.timing.pairing_grace,
            open_settle: config.timing.open_settle,
            teardown_delay: config.timing.teardown_delay,
        }
    }
}

/// The live session and its in-memory auth state.
struct ActiveSession {
    generation: u64,
    session: Arc<dyn LinkSession>,
    auth: AuthState,
    /// Set once the open sequence has started for this session
    opened: bool,
}

/// A session event tagged with the session that produced it.
struct Envelope {
    generation: u64,
    event: SessionEvent,
}

struct Inner {
    engine: Arc<dyn LinkEngine>,
    store: AuthStore,
    exporter: CredentialExporter,
    retry_cache: RetryCache,
    settings: CoordinatorSettings,
    active: Mutex<Option<ActiveSession>>,
    generations: AtomicU64,
    state: watch::Sender<LifecycleState>,
    mailbox: mpsc::UnboundedSender<Envelope>,
}

/// Handle to the coordinator. Clones share the same session.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Create the coordinator and spawn its event-handling task.
    pub fn new(
        engine: Arc<dyn LinkEngine>,
        store: AuthStore,
        exporter: CredentialExporter,
        retry_cache: RetryCache,
        settings: CoordinatorSettings,
    ) -> Self {
        let (mailbox, events) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(LifecycleState::Idle);

        let inner = Arc::new(Inner {
            engine,
            store,
            exporter,
            retry_cache,
            settings,
            active: Mutex::new(None),
            generations: AtomicU64::new(0),
            state,
            mailbox,
        });

        tokio::spawn(inner.clone().run(events));

        Self { inner }
    }

    /// Start a pairing attempt and return the formatted pairing code.
    ///
    /// Returns `None` when no code was requested: the stored credentials are
    /// already registered, or there is no number to pair.
    pub async fn connect(
        &self,
        request: Option<PairingRequest>,
    ) -> Result<Option<String>, ProxyError> {
        self.inner.connect(request).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    /// Whether a session is currently live.
    pub async fn has_session(&self) -> bool {
        self.inner.active.lock().await.is_some()
    }
}

impl Inner {
    fn set_state(&self, state: LifecycleState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Lifecycle transition");
        }
    }

    #[instrument(skip(self, request), fields(pairing = request.is_some()))]
    async fn connect(&self, request: Option<PairingRequest>) -> Result<Option<String>, ProxyError> {
        self.set_state(LifecycleState::PairingRequested);

        let (generation, session, registered) = {
            let mut active = self.active.lock().await;

            if let Some(previous) = active.take() {
                debug!(generation = previous.generation, "Finalizing previous session");
                if let Err(e) = previous.session.end().await {
                    warn!("Failed to end previous session: {}", e);
                }
            }

            let auth = match self.store.load().await {
                Ok(auth) => auth,
                Err(e) => {
                    self.set_state(LifecycleState::Idle);
                    return Err(e);
                }
            };
            let config = SessionConfig {
                creds: auth.creds.to_value(),
                keys: auth.keys.clone(),
                browser: self.settings.browser.clone(),
                mark_online_on_connect: self.settings.mark_online_on_connect,
                retry_cache: self.retry_cache.clone(),
            };

            let Connection { session, events } = match self.engine.connect(config).await {
                Ok(connection) => connection,
                Err(e) => {
                    self.set_state(LifecycleState::Idle);
                    return Err(e.into());
                }
            };

            let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
            let registered = auth.creds.registered();
            info!(generation, session_id = %session.id(), registered, "Session started");

            *active = Some(ActiveSession {
                generation,
                session: session.clone(),
                auth,
                opened: false,
            });

            // Subscribed before the lock is released, so no update can be missed
            tokio::spawn(pump(generation, events, self.mailbox.clone()));

            (generation, session, registered)
        };

        if registered {
            self.set_state(LifecycleState::AwaitingLink);
            return Ok(None);
        }

        let Some(request) = request else {
            warn!(generation, "Device not registered and no number to pair; awaiting link");
            self.set_state(LifecycleState::AwaitingLink);
            return Ok(None);
        };

        sleep(self.settings.pairing_grace).await;

        let phone_number = request.digits();
        match session.request_pairing_code(&phone_number).await {
            Ok(code) => {
                info!(generation, %phone_number, "Pairing code issued");
                self.set_state(LifecycleState::AwaitingLink);
                Ok(Some(format_pairing_code(&code)))
            }
            Err(e) => {
                self.discard(generation).await;
                self.set_state(LifecycleState::Idle);
                Err(e.into())
            }
        }
    }

    /// Handle session events one at a time, in arrival order.
    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = events.recv().await {
            self.handle(envelope).await;
        }
    }

    async fn current_generation(&self) -> Option<u64> {
        self.active.lock().await.as_ref().map(|a| a.generation)
    }

    async fn handle(self: &Arc<Self>, envelope: Envelope) {
        let Envelope { generation, event } = envelope;

        if self.current_generation().await != Some(generation) {
            debug!(generation, "Ignoring event from superseded session");
            return;
        }

        match event {
            SessionEvent::CredsUpdate(update) => self.persist_creds(generation, update).await,
            SessionEvent::KeysUpdate(update) => {
                let mut active = self.active.lock().await;
                if let Some(active) = active.as_mut().filter(|a| a.generation == generation) {
                    if let Err(e) = self.store.apply_key_update(&mut active.auth, update).await {
                        error!(generation, "Failed to persist key update: {}", e);
                    }
                }
            }
            SessionEvent::ConnectionUpdate(update) => {
                if update.is_open() {
                    if self.mark_opened(generation).await {
                        tokio::spawn(self.clone().open_sequence(generation));
                    } else {
                        debug!(generation, "Session already open");
                    }
                } else if update.is_closed() {
                    self.on_close(generation, update.disconnect_reason()).await;
                } else {
                    debug!(generation, ?update, "Connection update");
                }
            }
        }
    }

    async fn persist_creds(&self, generation: u64, update: Map<String, Value>) {
        let mut active = self.active.lock().await;
        if let Some(active) = active.as_mut().filter(|a| a.generation == generation) {
            active.auth.creds.merge(update);
            if let Err(e) = self.store.save_creds(&active.auth.creds).await {
                error!(generation, "Failed to persist credentials: {}", e);
            }
        }
    }

    /// Write the in-memory credentials again so the file on disk is current.
    async fn flush_creds(&self, generation: u64) {
        self.persist_creds(generation, Map::new()).await;
    }

    /// Claim the open sequence for `generation`. False if it already ran or
    /// the session is gone.
    async fn mark_opened(&self, generation: u64) -> bool {
        let mut active = self.active.lock().await;
        match active.as_mut().filter(|a| a.generation == generation) {
            Some(a) if !a.opened => {
                a.opened = true;
                true
            }
            _ => false,
        }
    }

    async fn open_sequence(self: Arc<Self>, generation: u64) {
        info!(generation, "Connected successfully");
        self.set_state(LifecycleState::Open);

        sleep(self.settings.open_settle).await;

        let (session, own_id) = {
            let active = self.active.lock().await;
            match active.as_ref().filter(|a| a.generation == generation) {
                Some(a) => (a.session.clone(), a.auth.creds.me().map(|me| me.id)),
                None => return,
            }
        };

        self.flush_creds(generation).await;
        self.set_state(LifecycleState::Exporting);

        let creds_path = self.store.creds_path();
        match own_id {
            Some(own_id) => {
                let session_id = self
                    .exporter
                    .run(session.as_ref(), &own_id, &creds_path)
                    .await;
                info!(generation, uploaded = session_id.is_uploaded(), "Export finished");
            }
            None => {
                error!(generation, "Linked account unknown, session id cannot be delivered");
                self.exporter.export(&creds_path).await;
            }
        }

        sleep(self.settings.teardown_delay).await;

        match self.teardown(generation).await {
            Ok(true) => info!(generation, "Session closed and cleaned"),
            Ok(false) => {}
            Err(e) => error!(generation, "Cleanup failed: {}", e),
        }
    }

    async fn on_close(&self, generation: u64, reason: Option<DisconnectReason>) {
        let code = reason.map(|r| r.status_code());

        match ReconnectDecision::for_reason(reason) {
            ReconnectDecision::Reconnect => {
                info!(generation, ?code, "Connection lost, reconnecting");
                self.set_state(LifecycleState::Reconnecting);
                if let Err(e) = self.connect(None).await {
                    error!(generation, "Reconnect failed: {}", e);
                }
            }
            ReconnectDecision::StayIdle => {
                info!(generation, "Device logged out, waiting for next request");
                self.discard(generation).await;
                if let Err(e) = self.store.wipe().await {
                    error!(generation, "Failed to wipe revoked credentials: {}", e);
                }
                self.set_state(LifecycleState::Idle);
            }
            ReconnectDecision::Ignore => {
                // The session stays in the slot until the next request finalizes it
                info!(generation, ?code, "Disconnected");
                self.set_state(LifecycleState::Disconnected);
            }
        }
    }

    /// Remove the live session if it is still `generation`.
    async fn take_active(&self, generation: u64) -> Option<ActiveSession> {
        let mut active = self.active.lock().await;
        if active.as_ref().map(|a| a.generation) == Some(generation) {
            active.take()
        } else {
            None
        }
    }

    /// End the session and drop it from the slot, keeping stored credentials.
    async fn discard(&self, generation: u64) {
        let previous = self.take_active(generation).await;

        if let Some(previous) = previous {
            if let Err(e) = previous.session.end().await {
                warn!(generation, "Failed to end session: {}", e);
            }
        }
    }

    /// End the session and wipe the session directory.
    ///
    /// Both steps always run; the first failure is reported. Returns
    /// `Ok(false)` without touching anything when `generation` has been
    /// superseded, since the directory then belongs to the newer session.
    async fn teardown(&self, generation: u64) -> Result<bool, TeardownError> {
        let Some(finished) = self.take_active(generation).await else {
            debug!(generation, "Session superseded, skipping teardown");
            return Ok(false);
        };

        let mut failure = None;

        if let Err(e) = finished.session.end().await {
            failure = Some(TeardownError::End(e));
        }

        if let Err(e) = self.store.wipe().await {
            failure.get_or_insert(TeardownError::Wipe(e));
        }

        self.set_state(LifecycleState::TornDown);

        match failure {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }
}

/// Forward one session's events into the coordinator mailbox.
async fn pump(generation: u64, mut events: EventStream, mailbox: mpsc::UnboundedSender<Envelope>) {
    while let Some(event) = events.next().await {
        if mailbox.send(Envelope { generation, event }).is_err() {
            break;
        }
    }
    debug!(generation, "Session event stream ended");
}
