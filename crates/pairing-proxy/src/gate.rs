//! Request gate.
//!
//! Serializes pairing requests so only one pairing sequence is ever in
//! flight. The lock covers pairing-code acquisition only; the rest of the
//! session lifecycle, including reconnects, runs outside it.

use crate::coordinator::Coordinator;
use crate::error::ProxyError;
use crate::pairing::PairingRequest;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

pub struct RequestGate {
    coordinator: Coordinator,
    lock: Mutex<()>,
}

impl RequestGate {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            lock: Mutex::new(()),
        }
    }

    /// Validate the number, wait for the gate, and start pairing.
    ///
    /// Concurrent callers queue rather than fail. Setup failures are logged
    /// and reported as an internal error.
    #[instrument(skip(self, phone_number))]
    pub async fn submit(&self, phone_number: Option<&str>) -> Result<String, ProxyError> {
        let request = PairingRequest::new(phone_number)?;

        let _permit = self.lock.lock().await;
        info!(phone_number = %request.digits(), "Pairing request admitted");

        match self.coordinator.connect(Some(request)).await {
            Ok(Some(code)) => Ok(code),
            Ok(None) => Err(ProxyError::AlreadyLinked),
            Err(e) => {
                error!("Pairing failed: {}", e);
                Err(ProxyError::Internal)
            }
        }
    }
}
