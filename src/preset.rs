use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// Named compression preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Preset {
    Medium,
    Small,
    Tiny,
}

/// Image quality and content-stream level applied by a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetConfig {
    /// JPEG quality (1-100, lower is smaller)
    pub image_quality: u8,
    /// zlib level for content streams (0-9, higher is smaller and slower)
    pub stream_compression_level: u32,
}

const MEDIUM: PresetConfig = PresetConfig {
    image_quality: 90,
    stream_compression_level: 3,
};
const SMALL: PresetConfig = PresetConfig {
    image_quality: 75,
    stream_compression_level: 5,
};
const TINY: PresetConfig = PresetConfig {
    image_quality: 50,
    stream_compression_level: 9,
};

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Medium, Preset::Small, Preset::Tiny];

    pub fn config(self) -> PresetConfig {
        match self {
            Preset::Medium => MEDIUM,
            Preset::Small => SMALL,
            Preset::Tiny => TINY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Medium => "medium",
            Preset::Small => "small",
            Preset::Tiny => "tiny",
        }
    }

    /// Capitalised name for notifications ("Small").
    pub fn display_name(self) -> &'static str {
        match self {
            Preset::Medium => "Medium",
            Preset::Small => "Small",
            Preset::Tiny => "Tiny",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(Preset::Medium),
            "small" => Ok(Preset::Small),
            "tiny" => Ok(Preset::Tiny),
            _ => Err(SessionError::UnknownPreset(s.to_string())),
        }
    }
}
