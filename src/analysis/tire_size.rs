//! Tire-size code extraction from recognized text
//!
//! Matches the sidewall size grammar `NNN/NNRNN` (width / aspect ratio,
//! radial construction, rim diameter), e.g. `205/55R16`.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Word-bounded tire-size grammar. Digits and word boundaries are ASCII
/// only, so an accented letter next to the code does not hide it.
static TIRE_SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u:\b)[0-9]{3}/[0-9]{2}R[0-9]{2}(?-u:\b)")
        .expect("tire size pattern is valid")
});

/// Text was recognized but contained no tire-size code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no tire size found in {text_len} characters of recognized text")]
pub struct NoMatchError {
    /// Length of the text that was searched
    pub text_len: usize,
}

/// A tire-size code exactly as it appeared in the recognized text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TireSize(String);

impl TireSize {
    /// The code verbatim, e.g. `"205/55R16"`
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The numeric fields of the code
    pub fn dimensions(&self) -> TireDimensions {
        TireDimensions {
            width_mm: self.width(),
            aspect_ratio: self.aspect_ratio(),
            rim_inches: self.rim_diameter(),
        }
    }

    /// Section width in millimetres
    pub fn width(&self) -> u16 {
        self.field(0..3)
    }

    /// Sidewall height as a percentage of the width
    pub fn aspect_ratio(&self) -> u8 {
        self.field(4..6) as u8
    }

    /// Rim diameter in inches
    pub fn rim_diameter(&self) -> u8 {
        self.field(7..9) as u8
    }

    // Only constructed from a grammar match, so every field is ASCII digits.
    fn field(&self, range: std::ops::Range<usize>) -> u16 {
        self.0[range]
            .bytes()
            .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'))
    }
}

impl fmt::Display for TireSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Width, profile and rim size read from a [`TireSize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TireDimensions {
    pub width_mm: u16,
    /// Sidewall height as a percentage of the width
    pub aspect_ratio: u8,
    pub rim_inches: u8,
}

impl fmt::Display for TireDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mm wide, {}% profile, {}\" rim",
            self.width_mm, self.aspect_ratio, self.rim_inches
        )
    }
}

impl Serialize for TireSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Find the leftmost tire-size code in normalized OCR text.
///
/// The match is returned as-is. Characters the OCR engine commonly
/// confuses (`O` for `0`, stray spaces inside the code) are not repaired,
/// so such text yields [`NoMatchError`].
pub fn extract(text: &str) -> Result<TireSize, NoMatchError> {
    TIRE_SIZE_PATTERN
        .find(text)
        .map(|m| TireSize(m.as_str().to_string()))
        .ok_or(NoMatchError {
            text_len: text.len(),
        })
}
