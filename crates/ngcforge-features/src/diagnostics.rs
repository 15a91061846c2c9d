//! Non-fatal issues collected while generating or migrating.

use ngcforge_core::{Error, MacroError, ResolutionError};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// A validation block check failed
    Validation,
    /// An `<eval>`, `<exec>`, `<subprocess>` or `<import>` failure
    Macro,
    /// A referenced template or file is missing
    Resolution,
}

/// One warning surfaced to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Id of the feature that raised it
    pub feature: String,
    pub message: String,
}

impl Diagnostic {
    pub fn validation(feature: &str, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Validation,
            feature: feature.to_string(),
            message: message.into(),
        }
    }

    pub fn from_macro(feature: &str, err: MacroError) -> Self {
        Self {
            kind: DiagnosticKind::Macro,
            feature: feature.to_string(),
            message: err.to_string(),
        }
    }

    pub fn from_resolution(feature: &str, err: ResolutionError) -> Self {
        Self {
            kind: DiagnosticKind::Resolution,
            feature: feature.to_string(),
            message: err.to_string(),
        }
    }

    /// The error value this diagnostic stands for
    pub fn to_error(&self) -> Error {
        match self.kind {
            DiagnosticKind::Validation => Error::Validation {
                feature: self.feature.clone(),
                message: self.message.clone(),
            },
            _ => Error::other(format!("{}: {}", self.feature, self.message)),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.feature, self.message)
    }
}
