//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, media root, auth, streaming, and indexing.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub auth: AuthConfig,
    pub stream: StreamConfig,
    pub indexer: IndexerConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if !self.media.root.is_dir() {
            warnings.push(format!(
                "media.root {} does not exist; it will be created on start",
                self.media.root.display()
            ));
        }

        match self.stream.token_secret.as_deref() {
            None => warnings.push(
                "stream.token_secret is not set; stream keys will not survive a restart".into(),
            ),
            Some(secret) if secret.len() < 16 => {
                warnings.push("stream.token_secret is shorter than 16 bytes".into());
            }
            Some(_) => {}
        }

        if self.stream.token_ttl_secs == 0 {
            warnings.push("stream.token_ttl_secs is 0; every stream key expires at once".into());
        }

        if self.indexer.workers == 0 {
            warnings.push("indexer.workers is 0; one worker will be used".into());
        }

        if self.indexer.schedule_interval_secs == Some(0) {
            warnings.push("indexer.schedule_interval_secs is 0; periodic indexing is disabled".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("/data/config/reelhouse.db"),
        }
    }
}

/// Location of media on disk. Library paths are relative to `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub root: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/data/media"),
        }
    }
}

impl MediaConfig {
    /// Absolute directory of a library whose media path is `media_path`.
    pub fn library_root(&self, media_path: &str) -> PathBuf {
        self.root.join(media_path)
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
}

/// Stream key signing and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// HMAC key for stream keys. A random key is generated per process when
    /// unset.
    pub token_secret: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_token_capacity")]
    pub token_cache_capacity: u64,
}

fn default_token_ttl() -> u64 {
    6 * 60 * 60
}

fn default_token_capacity() -> u64 {
    10_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_secs: default_token_ttl(),
            token_cache_capacity: default_token_capacity(),
        }
    }
}

/// Background indexing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Quick-index every library at this interval. `None` disables it.
    pub schedule_interval_secs: Option<u64>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    pub ffprobe_path: Option<PathBuf>,
}

fn default_workers() -> usize {
    1
}

fn default_probe_timeout() -> u64 {
    30
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            schedule_interval_secs: None,
            probe_timeout_secs: default_probe_timeout(),
            ffprobe_path: None,
        }
    }
}
