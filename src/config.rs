//! Configuration and settings management
//!
//! Loads settings from environment variables and defines pipeline constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub bot_token: String,

    /// Telegram ID of the bot owner (allowed to manage the user list)
    pub bot_owner_id: i64,

    /// Base URL of the metadata API; the percent-encoded link is appended to it
    #[serde(default = "default_terabox_api")]
    pub terabox_api: String,

    /// Display name of the promoted channel
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
    /// Link to the promoted channel
    #[serde(default = "default_channel_url")]
    pub channel_url: String,
    /// Picture attached to the `/start` reply
    #[serde(default = "default_welcome_url")]
    pub welcome_url: String,
    /// Picture attached to the `/userlist` reply
    #[serde(default = "default_photo_url")]
    pub photo_url: String,
    /// Contact button target on the `/userlist` reply
    #[serde(default = "default_contact_url")]
    pub contact_url: String,

    /// Maximum accepted file size in megabytes
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// Send videos with streaming support enabled
    #[serde(default = "default_supports_streaming")]
    pub supports_streaming: bool,
    /// Send videos hidden behind a spoiler
    #[serde(default)]
    pub has_spoiler: bool,

    /// JSON file holding the authorized user IDs
    #[serde(default = "default_authorized_users_file")]
    pub authorized_users_file: PathBuf,
    /// Root directory for per-job working directories
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Port of the health-check web server
    #[serde(default = "default_port")]
    pub port: u16,
    /// File receiving a copy of the log output
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Custom Bot API server (required for uploads larger than 50 MB)
    pub telegram_api_url: Option<String>,

    /// Path or name of the aria2c binary
    #[serde(default = "default_aria2c_bin")]
    pub aria2c_bin: String,
    /// Path or name of the ffprobe binary
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,
}

fn default_terabox_api() -> String {
    "https://angel-noor-terabox-api.woodmirror.workers.dev/api?url=".to_string()
}

fn default_channel_name() -> String {
    "⚡Team Sonu ™".to_string()
}

fn default_channel_url() -> String {
    "https://t.me/Team_Sonu2".to_string()
}

fn default_welcome_url() -> String {
    "https://ar-hosting.pages.dev/1751519807441.jpg".to_string()
}

fn default_photo_url() -> String {
    "https://ar-hosting.pages.dev/1751519808272.jpg".to_string()
}

fn default_contact_url() -> String {
    "https://t.me/Contact_AdminSbot".to_string()
}

const fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE_MB
}

const fn default_supports_streaming() -> bool {
    true
}

fn default_authorized_users_file() -> PathBuf {
    PathBuf::from("authorized_users.json")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

const fn default_port() -> u16 {
    8080
}

fn default_log_file() -> PathBuf {
    PathBuf::from("bot.log")
}

fn default_aria2c_bin() -> String {
    "aria2c".to_string()
}

fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use terabox_courier::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // APP_MAX_SIZE=500 sets `max_size`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables map to snake_case keys
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Maximum accepted file size in bytes
    #[must_use]
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size * 1024 * 1024
    }
}

/// Default maximum file size in megabytes
pub const DEFAULT_MAX_SIZE_MB: u64 = 1900;

/// Wall-clock bound for a single download (2 hours)
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 7200;
/// Bound for the ffprobe duration probe
pub const PROBE_TIMEOUT_SECS: u64 = 180;
/// Minimum upload timeout
pub const UPLOAD_TIMEOUT_FLOOR_SECS: u64 = 600;
/// Extra upload time granted per [`UPLOAD_TIMEOUT_CHUNK_BYTES`] of payload
pub const UPLOAD_TIMEOUT_PER_CHUNK_SECS: u64 = 60;
/// Payload chunk used to scale the upload timeout (50 MiB)
pub const UPLOAD_TIMEOUT_CHUNK_BYTES: u64 = 50 * 1024 * 1024;

/// How long a failure stays visible before the status message is deleted
pub const FAILURE_HOLD_SECS: u64 = 5;
/// How long "not authorized" and "invalid link" notices stay visible
pub const TRANSIENT_NOTICE_SECS: u64 = 10;
/// Flood-control waits longer than this are abandoned instead of retried
pub const FLOOD_WAIT_LIMIT_SECS: u64 = 600;

/// Default timeout for metadata API requests
pub const METADATA_HTTP_TIMEOUT_SECS: u64 = 60;

/// Get the metadata API timeout from env or default.
///
/// Environment variable: `METADATA_HTTP_TIMEOUT_SECS`.
#[must_use]
pub fn get_metadata_http_timeout_secs() -> u64 {
    std::env::var("METADATA_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(METADATA_HTTP_TIMEOUT_SECS)
}

/// Computes the upload timeout for a payload of `size_bytes`.
///
/// 600 seconds plus one minute per full 50 MiB chunk.
#[must_use]
pub const fn upload_timeout(size_bytes: u64) -> Duration {
    let chunks = size_bytes / UPLOAD_TIMEOUT_CHUNK_BYTES;
    Duration::from_secs(chunks * UPLOAD_TIMEOUT_PER_CHUNK_SECS + UPLOAD_TIMEOUT_FLOOR_SECS)
}
