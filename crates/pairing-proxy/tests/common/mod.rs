//! Common test utilities: in-process link engine and uploader fakes.

#![allow(dead_code)]

use async_trait::async_trait;
use link_client::{
    BrowserProfile, Connection, LinkEngine, LinkError, LinkSession, MessageContent, MessageKey,
    SendOptions, SentMessage, SessionConfig, SessionEvent,
};
use pairing_proxy::{
    auth::AuthStore, upload::Uploader, Coordinator, CoordinatorSettings, CredentialExporter,
    ExportSettings, LifecycleState, UploadError,
};
use retry_cache::RetryCache;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const PAIRING_CODE: &str = "ABCDEFGH";
pub const UPLOAD_URL: &str = "https://mega.nz/file/ABC123#key";
pub const OWN_ID: &str = "15551234567:7@s.whatsapp.net";

#[derive(Default)]
struct EngineState {
    connects: AtomicUsize,
    ended: AtomicUsize,
    pairing_in_flight: AtomicUsize,
    max_pairing_in_flight: AtomicUsize,
    fail_pairing: AtomicBool,
    pairing_delay: Mutex<Duration>,
    pairing_numbers: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, MessageContent, SendOptions)>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

/// Link engine whose sessions are driven by the test.
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairing_delay(self, delay: Duration) -> Self {
        *self.state.pairing_delay.lock().unwrap() = delay;
        self
    }

    pub fn failing_pairing(self) -> Self {
        self.state.fail_pairing.store(true, Ordering::SeqCst);
        self
    }

    /// Emit an event on the most recent session.
    pub fn emit(&self, event: SessionEvent) {
        let senders = self.state.senders.lock().unwrap();
        let sender = senders.last().expect("no session connected");
        sender.send(event).expect("event stream dropped");
    }

    /// Emit an event on the `index`-th session (0-based).
    pub fn emit_to(&self, index: usize, event: SessionEvent) {
        let senders = self.state.senders.lock().unwrap();
        senders[index].send(event).expect("event stream dropped");
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> usize {
        self.state.ended.load(Ordering::SeqCst)
    }

    pub fn max_pairing_in_flight(&self) -> usize {
        self.state.max_pairing_in_flight.load(Ordering::SeqCst)
    }

    pub fn pairing_numbers(&self) -> Vec<String> {
        self.state.pairing_numbers.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(String, MessageContent, SendOptions)> {
        self.state.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkEngine for FakeEngine {
    async fn connect(&self, _config: SessionConfig) -> Result<Connection, LinkError> {
        let n = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.senders.lock().unwrap().push(tx);

        Ok(Connection {
            session: Arc::new(FakeSession {
                id: format!("fake-{}", n),
                state: self.state.clone(),
            }),
            events: Box::pin(UnboundedReceiverStream::new(rx)),
        })
    }
}

struct FakeSession {
    id: String,
    state: Arc<EngineState>,
}

#[async_trait]
impl LinkSession for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, LinkError> {
        let in_flight = self.state.pairing_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_pairing_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = *self.state.pairing_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        self.state.pairing_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.state
            .pairing_numbers
            .lock()
            .unwrap()
            .push(phone_number.to_string());

        if self.state.fail_pairing.load(Ordering::SeqCst) {
            return Err(LinkError::Pairing("rejected".into()));
        }
        Ok(PAIRING_CODE.to_string())
    }

    async fn send_message(
        &self,
        to: &str,
        content: MessageContent,
        options: SendOptions,
    ) -> Result<SentMessage, LinkError> {
        let mut sent = self.state.sent.lock().unwrap();
        let id = format!("MSG{}", sent.len());
        sent.push((to.to_string(), content, options));

        Ok(SentMessage {
            key: MessageKey {
                remote_jid: to.to_string(),
                id,
                from_me: true,
            },
        })
    }

    async fn end(&self) -> Result<(), LinkError> {
        self.state.ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Uploader that snapshots the file it is given.
pub struct FakeUploader {
    url: Option<String>,
    uploaded: Mutex<Vec<String>>,
}

impl FakeUploader {
    pub fn new(url: Option<&str>) -> Self {
        Self {
            url: url.map(String::from),
            uploaded: Mutex::new(Vec::new()),
        }
    }

    /// Contents of each uploaded file, at upload time.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let content = tokio::fs::read_to_string(path).await?;
        self.uploaded.lock().unwrap().push(content);

        match &self.url {
            Some(url) => Ok(url.clone()),
            None => Err(UploadError::Rejected {
                status: 500,
                body: "file host down".into(),
            }),
        }
    }
}

pub fn fast_settings() -> CoordinatorSettings {
    CoordinatorSettings {
        browser: BrowserProfile::macos("Safari"),
        mark_online_on_connect: true,
        pairing_grace: Duration::from_millis(10),
        open_settle: Duration::from_millis(20),
        teardown_delay: Duration::from_millis(20),
    }
}

pub fn export_settings() -> ExportSettings {
    ExportSettings {
        message: "Device linked".into(),
        image_url: "https://img.example/logo.png".into(),
        prefix: "PFX~".into(),
        marker: "https://mega.nz/file/".into(),
        failure_sentinel: "UPLOAD_FAILED".into(),
    }
}

/// A coordinator wired to fakes, with its session directory in a temp dir.
pub struct Harness {
    pub engine: FakeEngine,
    pub uploader: Arc<FakeUploader>,
    pub coordinator: Coordinator,
    pub session_dir: PathBuf,
    _tmp: TempDir,
}

impl Harness {
    /// Must be called inside a tokio runtime.
    pub fn new(engine: FakeEngine, upload_url: Option<&str>) -> Self {
        Self::with_settings(engine, upload_url, fast_settings())
    }

    pub fn with_settings(
        engine: FakeEngine,
        upload_url: Option<&str>,
        settings: CoordinatorSettings,
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let session_dir = tmp.path().join("session");
        let uploader = Arc::new(FakeUploader::new(upload_url));

        let coordinator = Coordinator::new(
            Arc::new(engine.clone()),
            AuthStore::new(&session_dir),
            CredentialExporter::new(uploader.clone(), export_settings()),
            RetryCache::new(Duration::from_secs(60)),
            settings,
        );

        Self {
            engine,
            uploader,
            coordinator,
            session_dir,
            _tmp: tmp,
        }
    }
}

/// Credential update marking the device as linked to [`OWN_ID`].
pub fn linked_creds_update() -> SessionEvent {
    let update = serde_json::json!({
        "registered": true,
        "me": { "id": OWN_ID, "name": "Test User" }
    });
    SessionEvent::CredsUpdate(update.as_object().unwrap().clone())
}

/// Wait until the coordinator reaches `target`.
pub async fn wait_for_state(coordinator: &Coordinator, target: LifecycleState) {
    let mut rx = coordinator.subscribe();
    let wait = async {
        loop {
            if *rx.borrow_and_update() == target {
                return;
            }
            rx.changed().await.unwrap();
        }
    };

    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", target));
}

/// Poll `condition` until it holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for condition");
}
