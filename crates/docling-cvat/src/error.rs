//! Error types for annotation conversion.
//!
//! Annotation *quality* problems (a reading-order path that touches nothing,
//! an invalid merge, a reversed caption link) are not errors in this sense:
//! they are reported as [`Diagnostic`](crate::diagnostics::Diagnostic)s and
//! never abort the call. `CvatError` is reserved for inputs the library
//! cannot work with at all.

use thiserror::Error;

/// Errors that prevent a conversion from running.
///
/// # Examples
///
/// ```
/// use docling_cvat::{ConversionConfig, CvatError};
///
/// let config = ConversionConfig {
///     containment_threshold: 1.5,
///     ..ConversionConfig::default()
/// };
/// assert!(matches!(config.validate(), Err(CvatError::InvalidConfig { .. })));
/// ```
#[derive(Error, Debug)]
pub enum CvatError {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration
        reason: String,
    },

    /// The annotation XML could not be parsed.
    #[error("Malformed annotation XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The annotation XML parsed but is structurally unusable.
    #[error("Invalid annotation file: {0}")]
    InvalidAnnotation(String),

    /// A requested image is not present in the annotation file.
    #[error("Image not found in annotations: {0}")]
    ImageNotFound(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CvatError {
    /// Returns true if this error was caused by configuration (user-fixable).
    #[inline]
    #[must_use = "returns whether this is a configuration error"]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

/// Result type alias for annotation conversion.
pub type Result<T> = std::result::Result<T, CvatError>;
