// Transport settings - serializable snapshot of tempo, meter, swing and loop

use super::time::{DEFAULT_PPQ, TimeSignature};
use crate::error::{TransportError, TransportResult};
use ron::{from_str as ron_from_str, ser::PrettyConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persistent transport configuration
///
/// Time values are stored as time expressions ("8n", "1m", "384i").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub bpm: f64,
    pub ppq: u32,
    pub time_signature: TimeSignature,
    pub swing: f64,
    pub swing_subdivision: String,
    pub loop_enabled: bool,
    pub loop_start: String,
    /// One measure when unset
    pub loop_end: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            ppq: DEFAULT_PPQ,
            time_signature: TimeSignature::four_four(),
            swing: 0.0,
            swing_subdivision: "8n".to_string(),
            loop_enabled: false,
            loop_start: "0".to_string(),
            loop_end: None,
        }
    }
}

impl TransportSettings {
    /// Check the values that do not need a transport to resolve
    pub fn validate(&self) -> TransportResult<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(TransportError::invalid(format!(
                "bpm must be positive, got {}",
                self.bpm
            )));
        }
        if self.ppq == 0 {
            return Err(TransportError::invalid("PPQ must be at least 1"));
        }
        self.time_signature.validate()?;
        if !(0.0..=1.0).contains(&self.swing) {
            return Err(TransportError::invalid(format!(
                "swing must be within [0, 1], got {}",
                self.swing
            )));
        }
        Ok(())
    }

    pub fn from_ron_str(data: &str) -> TransportResult<Self> {
        ron_from_str(data).map_err(|e| {
            TransportError::SerializationError(format!("Failed to deserialize from RON: {}", e))
        })
    }

    pub fn to_ron_string(&self) -> TransportResult<String> {
        ron::ser::to_string_pretty(self, PrettyConfig::default()).map_err(|e| {
            TransportError::SerializationError(format!("Failed to serialize to RON: {}", e))
        })
    }

    pub fn from_json_str(data: &str) -> TransportResult<Self> {
        serde_json::from_str(data).map_err(|e| {
            TransportError::SerializationError(format!("Failed to deserialize from JSON: {}", e))
        })
    }

    pub fn to_json_string(&self) -> TransportResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            TransportError::SerializationError(format!("Failed to serialize to JSON: {}", e))
        })
    }

    /// Load from a `.ron` or `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> TransportResult<Self> {
        let path = path.as_ref();
        let format = SettingsFormat::from_path(path)?;
        let data = std::fs::read_to_string(path)?;
        let settings = match format {
            SettingsFormat::Ron => Self::from_ron_str(&data)?,
            SettingsFormat::Json => Self::from_json_str(&data)?,
        };
        log::debug!("Loaded transport settings from {}", path.display());
        Ok(settings)
    }

    /// Save to a `.ron` or `.json` file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TransportResult<()> {
        let path = path.as_ref();
        let data = match SettingsFormat::from_path(path)? {
            SettingsFormat::Ron => self.to_ron_string()?,
            SettingsFormat::Json => self.to_json_string()?,
        };
        std::fs::write(path, data)?;
        log::debug!("Saved transport settings to {}", path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsFormat {
    Ron,
    Json,
}

impl SettingsFormat {
    fn from_path(path: &Path) -> TransportResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ron") => Ok(SettingsFormat::Ron),
            Some("json") => Ok(SettingsFormat::Json),
            _ => Err(TransportError::SerializationError(format!(
                "Unsupported settings file extension: {}",
                path.display()
            ))),
        }
    }
}
