//! Configuration for the pairing proxy.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Proxy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Protocol bridge configuration
    #[serde(default)]
    pub link: LinkConfig,

    /// Session storage configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Credential upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Outbound notification configuration
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Lifecycle delays
    #[serde(default)]
    pub timing: TimingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory of static assets
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Protocol bridge URL
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Event poll interval
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Browser name presented in the client identity
    #[serde(default = "default_browser")]
    pub browser: String,

    /// Appear online as soon as the session connects
    #[serde(default = "default_true")]
    pub mark_online: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session storage directory (wiped on teardown)
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,

    /// Lifetime of message retry counters
    #[serde(default = "default_retry_ttl", with = "humantime_serde")]
    pub retry_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// File host upload endpoint
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,

    /// Bearer token for the file host
    #[serde(default)]
    pub token: Option<String>,

    /// URL prefix that precedes the session token in an upload link
    #[serde(default = "default_upload_marker")]
    pub marker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Confirmation text sent once the device is linked
    #[serde(default = "default_message")]
    pub message: String,

    /// Image attached to the session id message
    #[serde(default = "default_image_url")]
    pub image_url: String,

    /// Prefix prepended to the session id
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Session id reported when the upload fails
    #[serde(default = "default_failure_sentinel")]
    pub failure_sentinel: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Wait before requesting a pairing code
    #[serde(default = "default_pairing_grace", with = "humantime_serde")]
    pub pairing_grace: Duration,

    /// Wait after the link opens before exporting
    #[serde(default = "default_open_settle", with = "humantime_serde")]
    pub open_settle: Duration,

    /// Wait after exporting before teardown
    #[serde(default = "default_teardown_delay", with = "humantime_serde")]
    pub teardown_delay: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Pairing requests per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            poll_interval: default_poll_interval(),
            browser: default_browser(),
            mark_online: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            retry_ttl: default_retry_ttl(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_upload_endpoint(),
            token: None,
            marker: default_upload_marker(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            message: default_message(),
            image_url: default_image_url(),
            prefix: default_prefix(),
            failure_sentinel: default_failure_sentinel(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            pairing_grace: default_pairing_grace(),
            open_settle: default_open_settle(),
            teardown_delay: default_teardown_delay(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_bridge_url() -> String {
    "http://link-bridge:8080".into()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_browser() -> String {
    "Safari".into()
}

fn default_true() -> bool {
    true
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("./session")
}

fn default_retry_ttl() -> Duration {
    Duration::from_secs(600)
}

fn default_upload_endpoint() -> String {
    "http://file-host:8090/upload".into()
}

fn default_upload_marker() -> String {
    "https://mega.nz/file/".into()
}

fn default_message() -> String {
    "Device linked. Your session id follows; keep it private.".into()
}

fn default_image_url() -> String {
    "https://i.imgur.com/session.png".into()
}

fn default_prefix() -> String {
    "SESSION~".into()
}

fn default_failure_sentinel() -> String {
    "UPLOAD_FAILED".into()
}

fn default_pairing_grace() -> Duration {
    Duration::from_millis(1500)
}

fn default_open_settle() -> Duration {
    Duration::from_secs(5)
}

fn default_teardown_delay() -> Duration {
    Duration::from_secs(4)
}

fn default_per_minute() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.timing.pairing_grace, Duration::from_millis(1500));
        assert_eq!(config.timing.open_settle, Duration::from_secs(5));
        assert_eq!(config.timing.teardown_delay, Duration::from_secs(4));
        assert_eq!(config.notify.failure_sentinel, "UPLOAD_FAILED");
        assert_eq!(config.upload.marker, "https://mega.nz/file/");
        assert!(config.link.mark_online);
    }

    #[test]
    fn test_humantime_durations() {
        let json = r#"{ "timing": { "open_settle": "750ms", "teardown_delay": "2s" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.timing.open_settle, Duration::from_millis(750));
        assert_eq!(config.timing.teardown_delay, Duration::from_secs(2));
        assert_eq!(config.timing.pairing_grace, Duration::from_millis(1500));
    }
}
