//! Sizes for the additional volumes attached to a new instance.
//!
//! Sizes are written the way users type them on the command line (`50G`,
//! `50GB`, `500M`, `1T`). Units are decimal because the provider bills and
//! validates volume sizes in powers of ten; a bare number means gigabytes.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const KB: u64 = 1_000;
const MB: u64 = 1_000 * KB;
const GB: u64 = 1_000 * MB;
const TB: u64 = 1_000 * GB;

/// Size of one additional volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeSize {
    label: String,
    bytes: u64,
}

/// Errors raised when a volume size cannot be interpreted.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum VolumeSizeError {
    /// The size is missing its numeric part.
    #[error("volume size `{0}` does not start with a number")]
    MissingNumber(String),
    /// The unit suffix is not one of K, M, G, or T.
    #[error("volume size `{0}` has an unknown unit (expected K, M, G, or T)")]
    UnknownUnit(String),
    /// The size is zero.
    #[error("volume size `{0}` must be greater than zero")]
    Zero(String),
    /// The size does not fit in 64 bits.
    #[error("volume size `{0}` is too large")]
    Overflow(String),
}

impl VolumeSize {
    /// Parses a size such as `50G` or `50GB`.
    ///
    /// # Errors
    ///
    /// Returns [`VolumeSizeError`] when the number or unit is invalid.
    pub fn parse(raw: &str) -> Result<Self, VolumeSizeError> {
        let trimmed = raw.trim();
        let split = trimmed
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(VolumeSizeError::MissingNumber(raw.to_owned()));
        }

        let multiplier = match unit.to_ascii_uppercase().as_str() {
            "" | "G" | "GB" => GB,
            "K" | "KB" => KB,
            "M" | "MB" => MB,
            "T" | "TB" => TB,
            _ => return Err(VolumeSizeError::UnknownUnit(raw.to_owned())),
        };

        let value: u64 = digits
            .parse()
            .map_err(|_| VolumeSizeError::Overflow(raw.to_owned()))?;
        if value == 0 {
            return Err(VolumeSizeError::Zero(raw.to_owned()));
        }
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| VolumeSizeError::Overflow(raw.to_owned()))?;

        Ok(Self {
            label: trimmed.to_owned(),
            bytes,
        })
    }

    /// Returns the size in bytes.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the size exactly as the user wrote it.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl FromStr for VolumeSize {
    type Err = VolumeSizeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for VolumeSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
