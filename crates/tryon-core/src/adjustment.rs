//! User-supplied manual offsets applied on top of the solved transform.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Named manual adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdjustmentKey {
    Scale,
    OffsetX,
    OffsetY,
    OffsetZ,
    RotationX,
    RotationY,
    RotationZ,
}

impl AdjustmentKey {
    pub const ALL: [AdjustmentKey; 7] = [
        Self::Scale,
        Self::OffsetX,
        Self::OffsetY,
        Self::OffsetZ,
        Self::RotationX,
        Self::RotationY,
        Self::RotationZ,
    ];

    /// Value used when the key is absent.
    pub fn neutral(self) -> f32 {
        match self {
            Self::Scale => 1.0,
            _ => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::OffsetX => "offsetX",
            Self::OffsetY => "offsetY",
            Self::OffsetZ => "offsetZ",
            Self::RotationX => "rotationX",
            Self::RotationY => "rotationY",
            Self::RotationZ => "rotationZ",
        }
    }
}

impl fmt::Display for AdjustmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AdjustmentError {
    #[error("unknown adjustment key: {0}")]
    UnknownKey(String),
    #[error("expected key=value, got {0:?}")]
    Malformed(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: AdjustmentKey, value: String },
}

impl FromStr for AdjustmentKey {
    type Err = AdjustmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AdjustmentError::UnknownKey(s.to_string()))
    }
}

/// Sparse set of manual offsets; absent keys read as neutral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualAdjustment {
    values: BTreeMap<AdjustmentKey, f32>,
}

impl ManualAdjustment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: AdjustmentKey) -> f32 {
        self.values.get(&key).copied().unwrap_or_else(|| key.neutral())
    }

    pub fn set(&mut self, key: AdjustmentKey, value: f32) {
        self.values.insert(key, value);
    }

    pub fn with(mut self, key: AdjustmentKey, value: f32) -> Self {
        self.set(key, value);
        self
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a `key=value` pair, e.g. `offsetY=-4.5`.
    pub fn parse_pair(s: &str) -> Result<(AdjustmentKey, f32), AdjustmentError> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| AdjustmentError::Malformed(s.to_string()))?;
        let key: AdjustmentKey = key.trim().parse()?;
        let value = value
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| AdjustmentError::InvalidValue {
                key,
                value: value.to_string(),
            })?;
        Ok((key, value))
    }
}
