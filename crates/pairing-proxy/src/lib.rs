//! Pairing Proxy - links a phone number to a messaging account and exports
//! the resulting session.
//!
//! A pairing request yields a code the owner enters on their phone. Once the
//! link comes up, the session's credential file is uploaded and the derived
//! session id is sent to the account itself, after which the local session
//! is torn down.

pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod gate;
pub mod pairing;
pub mod upload;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorSettings, LifecycleState};
pub use error::{ProxyError, TeardownError, UploadError};
pub use export::{CredentialExporter, ExportSettings, SessionIdentifier};
pub use gate::RequestGate;
