//! Unit conversion utilities
//!
//! Handles conversion between Metric (mm) and Imperial (inch) systems and the
//! fixed-point decimal strings parameters are stored as.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// Measurement system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementSystem {
    /// Metric system (mm)
    #[default]
    Metric,
    /// Imperial system (inches)
    Imperial,
}

impl MeasurementSystem {
    pub fn is_metric(self) -> bool {
        self == Self::Metric
    }

    /// Units word used in the program preamble
    pub fn gcode(self) -> &'static str {
        match self {
            Self::Metric => "G21 (metric)",
            Self::Imperial => "G20 (imperial/inches)",
        }
    }
}

impl fmt::Display for MeasurementSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metric => write!(f, "Metric"),
            Self::Imperial => write!(f, "Imperial"),
        }
    }
}

impl FromStr for MeasurementSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "metric" | "mm" => Ok(Self::Metric),
            "imperial" | "inch" | "in" => Ok(Self::Imperial),
            _ => Err(format!("Unknown measurement system: {}", s)),
        }
    }
}

/// Parse a decimal number written with either `.` or `,` as separator.
///
/// Surrounding whitespace is ignored. Returns `None` for anything else.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replace(',', ".");
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read a float, `0.0` when unparseable
pub fn float_or_zero(text: &str) -> f64 {
    parse_decimal(text).unwrap_or(0.0)
}

/// Read an integer, truncating any fractional part toward zero; `0` when unparseable
pub fn int_or_zero(text: &str) -> i64 {
    let head = text.trim().split(['.', ',']).next().unwrap_or("");
    match head.parse::<i64>() {
        Ok(v) => v,
        Err(_) => parse_decimal(text).map(|v| v.trunc() as i64).unwrap_or(0),
    }
}

/// Fixed-point formatting with a `.` separator.
///
/// Negative zero prints without its sign.
pub fn format_fixed(value: f64, digits: usize) -> String {
    let s = format!("{:.*}", digits, value);
    if s.starts_with('-') && s[1..].chars().all(|c| c == '0' || c == '.') {
        s[1..].to_string()
    } else {
        s
    }
}

/// Swap the canonical `.` for a display separator
pub fn localize(canonical: &str, separator: char) -> String {
    if separator == '.' {
        canonical.to_string()
    } else {
        canonical.replace('.', &separator.to_string())
    }
}

pub fn inch_to_mm(value: f64) -> f64 {
    value * MM_PER_INCH
}

pub fn mm_to_inch(value: f64) -> f64 {
    value / MM_PER_INCH
}
