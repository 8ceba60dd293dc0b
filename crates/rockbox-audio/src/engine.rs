use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("engine rejected {command}: status {status}")]
    Rejected { command: String, status: u16 },
    #[error("unexpected engine response: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Where the engine currently is inside the loaded track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePosition {
    /// Milliseconds into the track.
    pub elapsed: u64,
    /// Byte offset into the file.
    pub offset: u64,
}

/// Operations the native audio engine must provide.
///
/// The engine is a collaborator: it decodes and plays one track at a time and
/// knows nothing about playlists or the play/pause state machine, which are
/// owned by the bridge's playback domain.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Load `path` and start playing at the given position.
    async fn play(&self, path: &Path, elapsed_ms: u64, offset: u64) -> Result<(), AudioError>;

    async fn pause(&self) -> Result<(), AudioError>;

    async fn resume(&self) -> Result<(), AudioError>;

    async fn stop(&self) -> Result<(), AudioError>;

    /// Jump to `elapsed_ms` inside the loaded track.
    async fn seek(&self, elapsed_ms: u64) -> Result<(), AudioError>;

    async fn position(&self) -> Result<EnginePosition, AudioError>;

    /// Drop buffered track data so the next read picks up fresh metadata.
    async fn flush_and_reload_tracks(&self) -> Result<(), AudioError>;

    /// Apply a sound setting (volume, balance, bass, ...) to the output stage.
    async fn set_sound(&self, setting: &str, value: i32) -> Result<(), AudioError>;

    /// Apply a pitch in tenths of a percent.
    async fn set_pitch(&self, pitch: i32) -> Result<(), AudioError>;

    /// Mix a sine beep into the output.
    async fn beep(&self, frequency_hz: u32, duration_ms: u32, amplitude: u32) -> Result<(), AudioError>;

    /// Shrink the PCM buffer for interactive sounds.
    async fn set_low_latency(&self, enabled: bool) -> Result<(), AudioError>;
}

// ─── HTTP engine ────────────────────────────────────────────────────

/// Connection settings for the Rockbox daemon's HTTP control port.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6063,
            timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ROCKBOX_HOST").unwrap_or(defaults.host),
            port: std::env::var("ROCKBOX_TCP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            timeout_secs: std::env::var("ROCKBOX_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize)]
struct FilePosition {
    position: u64,
    #[serde(default)]
    elapsed: u64,
}

/// Engine adapter that drives the Rockbox daemon over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, AudioError> {
        Self::with_base_url(&config.base_url(), config.timeout_secs)
    }

    pub fn with_base_url(base_url: &str, timeout_secs: u64) -> Result<Self, AudioError> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| AudioError::Config(format!("invalid engine url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AudioError::Config(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn url(&self, endpoint: &str, query: &[(&str, String)]) -> Result<url::Url, AudioError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| AudioError::Config(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn command(&self, endpoint: &str, query: &[(&str, String)]) -> Result<(), AudioError> {
        let url = self.url(endpoint, query)?;
        let resp = self
            .client
            .put(url)
            .send()
            .await
            .map_err(|e| AudioError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AudioError::Rejected {
                command: endpoint.to_string(),
                status: resp.status().as_u16(),
            });
        }
        tracing::debug!(command = %endpoint, "engine command accepted");
        Ok(())
    }
}

#[async_trait]
impl AudioEngine for HttpEngine {
    async fn play(&self, path: &Path, elapsed_ms: u64, offset: u64) -> Result<(), AudioError> {
        self.command(
            "play",
            &[
                ("path", path.to_string_lossy().into_owned()),
                ("elapsed", elapsed_ms.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.command("pause", &[]).await
    }

    async fn resume(&self) -> Result<(), AudioError> {
        self.command("resume", &[]).await
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.command("stop", &[]).await
    }

    async fn seek(&self, elapsed_ms: u64) -> Result<(), AudioError> {
        self.command("ff_rewind", &[("newtime", elapsed_ms.to_string())])
            .await
    }

    async fn position(&self) -> Result<EnginePosition, AudioError> {
        let url = self.url("file_position", &[])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AudioError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AudioError::Rejected {
                command: "file_position".into(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp
            .json::<FilePosition>()
            .await
            .map_err(|e| AudioError::Decode(e.to_string()))?;
        Ok(EnginePosition {
            elapsed: body.elapsed,
            offset: body.position,
        })
    }

    async fn flush_and_reload_tracks(&self) -> Result<(), AudioError> {
        self.command("flush_and_reload_tracks", &[]).await
    }

    async fn set_sound(&self, setting: &str, value: i32) -> Result<(), AudioError> {
        self.command(&format!("sound/{setting}"), &[("value", value.to_string())])
            .await
    }

    async fn set_pitch(&self, pitch: i32) -> Result<(), AudioError> {
        self.command("pitch", &[("value", pitch.to_string())]).await
    }

    async fn beep(&self, frequency_hz: u32, duration_ms: u32, amplitude: u32) -> Result<(), AudioError> {
        self.command(
            "beep",
            &[
                ("frequency", frequency_hz.to_string()),
                ("duration", duration_ms.to_string()),
                ("amplitude", amplitude.to_string()),
            ],
        )
        .await
    }

    async fn set_low_latency(&self, enabled: bool) -> Result<(), AudioError> {
        self.command("pcmbuf/low_latency", &[("enabled", enabled.to_string())])
            .await
    }
}
