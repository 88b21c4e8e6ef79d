// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};
use crate::spatial::head::{HeadModel, HEAD_RADIUS_M, SPEED_OF_SOUND_M_S};
use crate::spatial::renderer::{
    RenderParams, DEFAULT_BOOST, DEFAULT_OUTPUT_CEILING, DEFAULT_RADIANS_PER_MS,
};

/// Playback and rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub sweep_radians_per_ms: f32,
    pub boost: f32,
    pub output_ceiling: f32, // below full scale, [0.0, 1.0)
    pub head_radius_m: f32,
    pub speed_of_sound_m_s: f32,
    /// Device queue length requested from the output
    pub buffer_duration_ms: f64,
    /// Output device name; the system default when unset
    pub device: Option<String>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            sweep_radians_per_ms: DEFAULT_RADIANS_PER_MS,
            boost: DEFAULT_BOOST,
            output_ceiling: DEFAULT_OUTPUT_CEILING,
            head_radius_m: HEAD_RADIUS_M,
            speed_of_sound_m_s: SPEED_OF_SOUND_M_S,
            buffer_duration_ms: 33.33,
            device: None,
        }
    }
}

impl PlaybackSettings {
    /// Load settings from file, or return defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = ?path, "No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Settings(format!("Failed to read {}: {}", path.display(), e)))?;

        let settings: PlaybackSettings = serde_json::from_str(&content)
            .map_err(|e| Error::Settings(format!("Failed to parse {}: {}", path.display(), e)))?;
        settings.validate()?;

        info!(path = ?path, "Loaded settings");
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Settings(format!("Failed to serialize settings: {}", e)))?;

        fs::write(path, content)
            .map_err(|e| Error::Settings(format!("Failed to write {}: {}", path.display(), e)))?;

        info!(path = ?path, "Saved settings");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.sweep_radians_per_ms,
            self.boost,
            self.output_ceiling,
            self.head_radius_m,
            self.speed_of_sound_m_s,
        ];
        if finite.iter().any(|v| !v.is_finite()) || !self.buffer_duration_ms.is_finite() {
            return Err(Error::Settings("values must be finite".to_string()));
        }
        if !(0.0..1.0).contains(&self.output_ceiling) {
            return Err(Error::Settings(format!(
                "output_ceiling must be at least 0.0 and below 1.0, got {}",
                self.output_ceiling
            )));
        }
        if self.speed_of_sound_m_s <= 0.0 || self.head_radius_m < 0.0 {
            return Err(Error::Settings(
                "head_radius_m must be non-negative and speed_of_sound_m_s positive".to_string(),
            ));
        }
        if self.buffer_duration_ms <= 0.0 {
            return Err(Error::Settings(format!(
                "buffer_duration_ms must be positive, got {}",
                self.buffer_duration_ms
            )));
        }
        Ok(())
    }

    pub fn render_params(&self) -> RenderParams {
        RenderParams {
            radians_per_ms: self.sweep_radians_per_ms,
            boost: self.boost,
            output_ceiling: self.output_ceiling,
            head: HeadModel {
                radius_m: self.head_radius_m,
                speed_of_sound_m_s: self.speed_of_sound_m_s,
            },
        }
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_duration_ms / 1000.0)
    }
}
