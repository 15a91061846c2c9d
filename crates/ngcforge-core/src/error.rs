//! Error handling for ngcforge
//!
//! Provides the error kinds shared by every layer of the feature compiler:
//! - Parse errors (malformed definition or project files)
//! - Resolution errors (templates, files or instances that cannot be found)
//! - Macro errors (eval/exec/subprocess/import failures inside a text block)
//! - Validation warnings raised by a feature's own validation block
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Parse error type
///
/// Raised when a definition file or a project document is structurally malformed.
/// A parse error aborts the operation that hit it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Syntax problem inside a definition file
    #[error("{source_name}:{line}: {reason}")]
    Definition {
        /// Name of the definition source (file name or `<memory>`).
        source_name: String,
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// A required section is absent
    #[error("{source_name}: missing required section [{section}]")]
    MissingSection {
        /// Name of the definition source.
        source_name: String,
        /// The section name.
        section: String,
    },

    /// A required key is absent
    #[error("{source_name}: [{section}] has no '{field}'")]
    MissingField {
        /// Name of the definition source.
        source_name: String,
        /// The section the key belongs to.
        section: String,
        /// The missing key.
        field: String,
    },

    /// Malformed project document
    #[error("Invalid project document: {reason}")]
    Project {
        /// What went wrong.
        reason: String,
    },

    /// A value that cannot be interpreted
    #[error("Invalid value '{value}' for {field}")]
    InvalidValue {
        /// The field being parsed.
        field: String,
        /// The offending text.
        value: String,
    },
}

/// Resolution error type
///
/// Something referenced by name could not be found.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    /// No definition file for a template source name
    #[error("Template not found: {name}")]
    TemplateNotFound {
        /// The template source name.
        name: String,
    },

    /// A file referenced from a text block or configuration
    #[error("File not found: {name}")]
    FileNotFound {
        /// The requested file name.
        name: String,
    },

    /// No feature instance with this id in the document
    #[error("Feature instance not found: {id}")]
    InstanceNotFound {
        /// The instance id.
        id: String,
    },

    /// No parameter with this id on the feature
    #[error("Parameter '{param}' not found on {feature}")]
    ParamNotFound {
        /// The feature id.
        feature: String,
        /// The parameter id or call token.
        param: String,
    },
}

/// Macro error type
///
/// Failure while expanding one of the text-block directives. These are
/// recovered locally: the directive expands to empty (or captured output).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MacroError {
    /// Expression could not be evaluated
    #[error("Cannot evaluate '{expr}': {reason}")]
    Eval {
        /// The expression text.
        expr: String,
        /// The reason evaluation failed.
        reason: String,
    },

    /// `<exec>` blocks are not executed
    #[error("<exec> is not supported in {feature}, block ignored")]
    Exec {
        /// The feature id.
        feature: String,
    },

    /// Subprocess exited with a failure status
    #[error("Subprocess '{command}' failed with exit code {code:?}\noutput = {output}")]
    Subprocess {
        /// The shell command.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Combined stdout and stderr.
        output: String,
    },

    /// Imported file could not be read
    #[error("Cannot import '{name}': {reason}")]
    Import {
        /// The file name in the directive.
        name: String,
        /// The reason the import failed.
        reason: String,
    },
}

/// Main error type for ngcforge
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Resolution error
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Macro error
    #[error(transparent)]
    Macro(#[from] MacroError),

    /// Validation warning from a feature's validation block
    #[error("{feature}: {message}")]
    Validation {
        /// The feature name.
        feature: String,
        /// The message declared by the validation block.
        message: String,
    },

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Check if this is a resolution error
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }

    /// Check if this is a macro error
    pub fn is_macro_error(&self) -> bool {
        matches!(self, Error::Macro(_))
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Structural errors abort the whole operation; everything else is a diagnostic.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Io(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::MissingSection {
            source_name: "pocket.cfg".to_string(),
            section: "SUBROUTINE".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "pocket.cfg: missing required section [SUBROUTINE]"
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ResolutionError::FileNotFound {
            name: "lib.ngc".to_string(),
        }
        .into();
        assert!(err.is_resolution_error());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "File not found: lib.ngc");
    }

    #[test]
    fn test_io_error_is_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(err.is_io_error());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_subprocess_error_mentions_code() {
        let err = MacroError::Subprocess {
            command: "false".to_string(),
            code: Some(1),
            output: String::new(),
        };
        assert!(err.to_string().contains("exit code Some(1)"));
    }
}
