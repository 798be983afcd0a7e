//! Video duration probing.
//!
//! [`FfprobeProbe`] shells out to `ffprobe -v quiet -print_format json
//! -show_format` and reads `format.duration`. The indexer only ever sees the
//! [`MetadataProbe`] trait, so tests can swap in a fixed double.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rh_core::config::IndexerConfig;
use rh_core::{Error, Result};
use serde::Deserialize;
use tokio::process::Command;

/// Source of media durations.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Duration of the media file at `path`.
    async fn probe(&self, path: &Path) -> Result<Duration>;
}

/// A probe backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Use the configured binary, or find `ffprobe` on `PATH`.
    pub fn discover(config: &IndexerConfig) -> Option<Self> {
        let binary = match &config.ffprobe_path {
            Some(path) => path.clone(),
            None => which::which("ffprobe").ok()?,
        };
        Some(Self::new(
            binary,
            Duration::from_secs(config.probe_timeout_secs.max(1)),
        ))
    }
}

#[async_trait]
impl MetadataProbe for FfprobeProbe {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<Duration> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::Probe(format!("failed to spawn ffprobe: {e}")))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::Probe(format!("I/O error waiting for ffprobe: {e}")));
            }
            Err(_elapsed) => {
                return Err(Error::Probe(format!(
                    "ffprobe timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if !output.status.success() {
            return Err(Error::Probe(format!(
                "ffprobe exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_duration_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Stand-in used when no ffprobe binary is available. Every probe fails, so
/// full indexes still run and leave durations empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProbe;

#[async_trait]
impl MetadataProbe for UnavailableProbe {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn probe(&self, path: &Path) -> Result<Duration> {
        Err(Error::Probe(format!(
            "no probe available for {}",
            path.display()
        )))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Extract `format.duration` from ffprobe's JSON output.
pub fn parse_duration_output(json: &str) -> Result<Duration> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let raw = ff
        .format
        .duration
        .ok_or_else(|| Error::Probe("ffprobe reported no duration".into()))?;
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Probe(format!("invalid duration {raw:?}")))?;

    Duration::try_from_secs_f64(secs).map_err(|_| Error::Probe(format!("invalid duration {raw:?}")))
}
