use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub framing: FramingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FramingConfig {
    /// Largest payload length accepted from a frame header. Anything above
    /// closes the connection before a single payload byte is read.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u32,
    /// Upper bound for a single socket read while assembling a payload.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Per-read timeout; 0 disables it.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_hook")]
    pub hook: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_fps")]
    pub fps: f64,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_sender_addr")]
    pub addr: String,
    #[serde(default = "default_sender_fps")]
    pub fps: f64,
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            max_frame_len: default_max_frame_len(),
            chunk_size: default_chunk_size(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            hook: default_hook(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            fps: default_preview_fps(),
            snapshot_path: None,
            snapshot_every: default_snapshot_every(),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            addr: default_sender_addr(),
            fps: default_sender_fps(),
            source_dir: None,
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// `host:port` in the form accepted by `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FramingConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl PreviewConfig {
    /// Poll period derived from `fps`. Only meaningful after validation.
    pub fn period(&self) -> Duration {
        fps_period(self.fps).unwrap_or(Duration::from_secs(1))
    }
}

impl SenderConfig {
    /// Send period derived from `fps`. Only meaningful after validation.
    pub fn period(&self) -> Duration {
        fps_period(self.fps).unwrap_or(Duration::from_secs(1))
    }
}

/// `1 / fps` as a non-zero duration, or `None` for NaN, infinite,
/// non-positive or so-large-it-rounds-to-zero rates.
fn fps_period(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps)
        .ok()
        .filter(|period| !period.is_zero())
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.framing.chunk_size == 0 {
            return Err(ConfigError::Invalid("framing.chunk_size must be > 0".into()));
        }
        if self.framing.max_frame_len == 0 {
            return Err(ConfigError::Invalid("framing.max_frame_len must be > 0".into()));
        }
        if fps_period(self.preview.fps).is_none() {
            return Err(ConfigError::Invalid(format!(
                "preview.fps must be a positive finite rate, got {}",
                self.preview.fps
            )));
        }
        if fps_period(self.sender.fps).is_none() {
            return Err(ConfigError::Invalid(format!(
                "sender.fps must be a positive finite rate, got {}",
                self.sender.fps
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_max_frame_len() -> u32 {
    8 * 1024 * 1024
}
fn default_chunk_size() -> usize {
    4096
}
fn default_read_timeout_secs() -> u64 {
    10
}
fn default_hook() -> String {
    "colormap".into()
}
fn default_preview_fps() -> f64 {
    30.0
}
fn default_snapshot_every() -> u64 {
    30
}
fn default_sender_addr() -> String {
    "127.0.0.1:8000".into()
}
fn default_sender_fps() -> f64 {
    10.0
}
fn default_width() -> u32 {
    320
}
fn default_height() -> u32 {
    240
}
fn default_quality() -> u8 {
    80
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.framing.chunk_size, 4096);
        assert_eq!(config.framing.read_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.processing.hook, "colormap");
        assert!(config.preview.snapshot_path.is_none());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 9100

            [framing]
            read_timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.framing.max_frame_len, 8 * 1024 * 1024);
        assert!(config.framing.read_timeout().is_none());
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let err = Config::parse("[framing]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn non_finite_or_degenerate_fps_rejected() {
        for section in ["preview", "sender"] {
            for fps in ["nan", "inf", "-inf", "0.0", "-5.0", "1e300"] {
                let err = Config::parse(&format!("[{section}]\nfps = {fps}\n")).unwrap_err();
                assert!(
                    matches!(err, ConfigError::Invalid(_)),
                    "{section}.fps = {fps} should be rejected"
                );
            }
        }
    }

    #[test]
    fn fps_converts_to_period() {
        let config = Config::parse("[preview]\nfps = 4.0\n[sender]\nfps = 0.5\n").unwrap();
        assert_eq!(config.preview.period(), Duration::from_millis(250));
        assert_eq!(config.sender.period(), Duration::from_secs(2));
        assert!(!Config::default().preview.period().is_zero());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = Config::parse("[server\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("frame-relay-does-not-exist.toml");
        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.server.port, 8000);
        assert!(Config::load(&path).is_err());
    }
}
