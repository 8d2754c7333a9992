//! Error types for header inspection.

use thiserror::Error;

/// Header inspection error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed {format} header: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    #[error("unsupported {format} stream: {message}")]
    Unsupported {
        format: &'static str,
        message: String,
    },
}

impl CodecError {
    pub(crate) fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            format,
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(format: &'static str, message: impl Into<String>) -> Self {
        Self::Unsupported {
            format,
            message: message.into(),
        }
    }
}

/// Result type alias for header inspection.
pub type Result<T> = std::result::Result<T, CodecError>;
