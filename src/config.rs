use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::source::SourceKind,
};

/// Main configuration for motion-sentinel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Motion detection settings
    pub detection: DetectionConfig,

    /// Recording lifecycle settings
    pub recording: RecordingConfig,

    /// Frame source settings
    pub source: SourceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            recording: RecordingConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|_| ConfigError::ParseFailed {
            path: path.display().to_string(),
        })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.recording.validate()?;
        self.source.validate()?;
        Ok(())
    }
}

/// Motion detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Percentage of changed pixels (strictly) above which a frame counts as motion
    pub threshold_percent: u8,

    /// Box blur window size for sensor-noise suppression (odd, e.g. 5 for 5x5)
    pub blur_window: u32,

    /// Radius of the morphological open structuring element (removes small blobs)
    pub open_radius: u32,

    /// Radius of the morphological close structuring element (fills small holes)
    pub close_radius: u32,

    /// Intensity cutoff for the binary threshold on the difference image
    pub diff_cutoff: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_percent: 8,
            blur_window: 5,
            open_radius: 5,
            close_radius: 0,
            diff_cutoff: 10,
        }
    }
}

impl DetectionConfig {
    fn validate(&self) -> Result<()> {
        if self.threshold_percent > 100 {
            return Err(ConfigError::InvalidValue {
                key: "detection.threshold_percent".to_string(),
                value: self.threshold_percent.to_string(),
            }
            .into());
        }

        if self.blur_window == 0 || self.blur_window % 2 == 0 {
            return Err(ConfigError::InvalidValue {
                key: "detection.blur_window".to_string(),
                value: self.blur_window.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Recording lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Seconds of pre-motion context prepended to every clip
    pub prerecord_secs: f64,

    /// Seconds the clip stays open after motion stops; defaults to
    /// `prerecord_secs` when absent
    pub postrecord_secs: Option<f64>,

    /// Directory clip files are written to
    pub output_dir: PathBuf,

    /// Video codec for encoded clips
    pub codec: String,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            prerecord_secs: 5.0,
            postrecord_secs: None,
            output_dir: PathBuf::from("output"),
            codec: "libx264".to_string(),
            quality: 85,
        }
    }
}

impl RecordingConfig {
    /// Pre-roll window length
    pub fn prerecord(&self) -> Duration {
        Duration::from_secs_f64(self.prerecord_secs)
    }

    /// Post-motion hold length; falls back to the pre-roll length
    pub fn postrecord(&self) -> Duration {
        Duration::from_secs_f64(self.postrecord_secs.unwrap_or(self.prerecord_secs))
    }

    fn validate(&self) -> Result<()> {
        if !self.prerecord_secs.is_finite() || self.prerecord_secs < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "recording.prerecord_secs".to_string(),
                value: self.prerecord_secs.to_string(),
            }
            .into());
        }

        if let Some(post) = self.postrecord_secs {
            if !post.is_finite() || post < 0.0 {
                return Err(ConfigError::InvalidValue {
                    key: "recording.postrecord_secs".to_string(),
                    value: post.to_string(),
                }
                .into());
            }
        }

        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "recording.quality".to_string(),
                value: self.quality.to_string(),
            }
            .into());
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "recording.output_dir".to_string(),
                value: "<empty>".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// Frame source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Which source to watch: a live camera or an input file/directory
    pub kind: SourceKind,

    /// Requested capture width for live cameras
    pub capture_width: u32,

    /// Requested capture height for live cameras
    pub capture_height: u32,

    /// Capture rate for live cameras; also the synthetic rate assigned to
    /// image-directory sources, which carry no timing of their own
    pub capture_fps: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            capture_width: 640,
            capture_height: 480,
            capture_fps: 30.0,
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(ConfigError::InvalidValue {
                key: "source.capture_size".to_string(),
                value: format!("{}x{}", self.capture_width, self.capture_height),
            }
            .into());
        }

        if !self.capture_fps.is_finite() || self.capture_fps <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "source.capture_fps".to_string(),
                value: self.capture_fps.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original = Config::default();
        original.detection.threshold_percent = 12;
        original.recording.postrecord_secs = Some(3.0);

        original.save_to_file(&file_path).unwrap();
        let loaded = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded.detection.threshold_percent, 12);
        assert_eq!(loaded.recording.postrecord_secs, Some(3.0));
        assert_eq!(loaded.source.capture_fps, original.source.capture_fps);
    }

    #[test]
    fn test_postrecord_defaults_to_prerecord() {
        let mut recording = RecordingConfig::default();
        recording.prerecord_secs = 2.0;
        recording.postrecord_secs = None;
        assert_eq!(recording.postrecord(), Duration::from_secs(2));

        recording.postrecord_secs = Some(7.0);
        assert_eq!(recording.postrecord(), Duration::from_secs(7));
    }

    #[test]
    fn test_invalid_threshold_percent() {
        let mut config = Config::default();
        config.detection.threshold_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_even_blur_window_rejected() {
        let mut config = Config::default();
        config.detection.blur_window = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_prerecord_rejected() {
        let mut config = Config::default();
        config.recording.prerecord_secs = -1.0;
        assert!(config.validate().is_err());
    }
}
