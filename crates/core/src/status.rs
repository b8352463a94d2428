//! Platform and status enums shared across the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Messaging platform a number is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Whatsapp,
    Telegram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "whatsapp" => Ok(Self::Whatsapp),
            "telegram" => Ok(Self::Telegram),
            other => Err(Error::validation(format!("unknown platform: {other}"))),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a comma-separated platform list (queue message wire form).
pub fn parse_platforms(s: &str) -> Result<Vec<Platform>> {
    s.split(',')
        .filter(|p| !p.is_empty())
        .map(Platform::parse)
        .collect()
}

/// Joins platforms into the comma-separated wire form.
pub fn platforms_to_string(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// WhatsApp check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaStatus {
    Registered,
    NotRegistered,
    BusinessActive,
    Unknown,
}

impl WaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::NotRegistered => "not_registered",
            Self::BusinessActive => "business_active",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "not_registered" => Some(Self::NotRegistered),
            "business_active" => Some(Self::BusinessActive),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Telegram check result. Telegram has no business-account signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TgStatus {
    Registered,
    NotRegistered,
    Unknown,
}

impl TgStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::NotRegistered => "not_registered",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "not_registered" => Some(Self::NotRegistered),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// A platform-tagged status, the unit every checker produces and every item
/// write consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformStatus {
    Wa(WaStatus),
    Tg(TgStatus),
}

impl PlatformStatus {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Wa(_) => Platform::Whatsapp,
            Self::Tg(_) => Platform::Telegram,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wa(s) => s.as_str(),
            Self::Tg(s) => s.as_str(),
        }
    }

    /// Parses a status string for the given platform; the wire forms overlap
    /// so the platform must come from context (cache key, message field).
    pub fn parse(platform: Platform, s: &str) -> Option<Self> {
        match platform {
            Platform::Whatsapp => WaStatus::parse(s).map(Self::Wa),
            Platform::Telegram => TgStatus::parse(s).map(Self::Tg),
        }
    }

    /// Unknown means the check failed to resolve conclusively.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            Self::Wa(WaStatus::Unknown) | Self::Tg(TgStatus::Unknown)
        )
    }
}
