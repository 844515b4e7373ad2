//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The confidence value was out of range.
    #[error("confidence must be between 0.0 and 1.0, got {value}")]
    ConfidenceOutOfRange { value: f32 },
}

/// A confidence score in the range \[0.0, 1.0\].
///
/// Used to indicate how confident the classifier is in an analysis.
/// Values are clamped during deserialization to be lenient with
/// external model output.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f32);

impl Confidence {
    /// The maximum confidence value (1.0).
    pub const MAX: Self = Self(1.0);

    /// The minimum confidence value (0.0).
    pub const MIN: Self = Self(0.0);

    /// Creates a new confidence value after validation.
    ///
    /// Returns an error if the value is outside \[0.0, 1.0\] or is NaN.
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(Self(value))
    }

    /// Creates a confidence value, clamping to \[0.0, 1.0\].
    ///
    /// NaN values become 0.0. Values outside the range are clamped.
    #[must_use]
    pub const fn clamped(value: f32) -> Self {
        if value.is_nan() || value < 0.0 {
            Self(0.0)
        } else if value > 1.0 {
            Self(1.0)
        } else {
            Self(value)
        }
    }

    /// Returns the inner f32 value.
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<f32> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl Serialize for Confidence {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f32::deserialize(deserializer)?;
        // Clamp on deserialization to be lenient with external data
        Ok(Self::clamped(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_validates_range() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(0.5).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(-0.1).is_err());
        assert!(Confidence::new(1.1).is_err());
        assert!(Confidence::new(f32::NAN).is_err());
    }

    #[test]
    #[expect(
        clippy::float_cmp,
        reason = "exact equality intended for boundary tests"
    )]
    fn confidence_clamped_handles_edge_cases() {
        assert_eq!(Confidence::clamped(-1.0).value(), 0.0);
        assert_eq!(Confidence::clamped(2.0).value(), 1.0);
        assert_eq!(Confidence::clamped(f32::NAN).value(), 0.0);
        assert_eq!(Confidence::clamped(0.5).value(), 0.5);
    }

    #[test]
    fn confidence_serde_roundtrip() {
        let c = Confidence::new(0.85).unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "0.85");
        let parsed: Confidence = serde_json::from_str(&json).unwrap();
        assert!((parsed.value() - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    #[expect(
        clippy::float_cmp,
        reason = "exact equality intended for boundary tests"
    )]
    fn confidence_serde_clamps_out_of_range() {
        let parsed: Confidence = serde_json::from_str("1.5").unwrap();
        assert_eq!(parsed.value(), 1.0);

        let parsed: Confidence = serde_json::from_str("-0.5").unwrap();
        assert_eq!(parsed.value(), 0.0);
    }
}
