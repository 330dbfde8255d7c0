use crate::gaze::GazeDataMode;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub recording: RecordingConfig,
    pub overlay: OverlayConfig,
    pub gaze: GazeConfig,
}

impl Config {
    /// Reads the config at `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gazecast")
            .join("config.json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_path: PathBuf,
    pub fps: u32,
    pub codec: String,
    pub bitrate: u64,
    pub log_extension: String,
    pub ffmpeg_binary: PathBuf,
}

impl RecordingConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let output_path = dirs::video_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gaze_recording.mp4");

        Self {
            output_path,
            fps: 25,
            codec: "mpeg4".to_string(),
            bitrate: 8_000_000,
            log_extension: "csv".to_string(),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    pub trail_capacity: usize,
    pub marker_diameter: u32,
    pub trail_line_alpha: u8,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            trail_capacity: 10,
            marker_diameter: 10,
            trail_line_alpha: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GazeConfig {
    pub mode: GazeDataMode,
    pub bind_addr: String,
    /// Tracker bridge to subscribe with; without one the bridge streams unasked.
    pub bridge_addr: Option<String>,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            mode: GazeDataMode::LightlyFiltered,
            bind_addr: "127.0.0.1:4242".to_string(),
            bridge_addr: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_40ms() {
        let config = RecordingConfig::default();
        assert_eq!(config.fps, 25);
        assert_eq!(config.frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.recording.bitrate = 4_000_000;
        config.gaze.mode = GazeDataMode::Unfiltered;
        config.gaze.bridge_addr = Some("127.0.0.1:4243".to_string());
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "overlay": { "marker_diameter": 16 } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.overlay.marker_diameter, 16);
        assert_eq!(config.overlay.trail_capacity, 10);
        assert_eq!(config.recording.codec, "mpeg4");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
