//! Errors raised while reading simulation output files.
use std::path::PathBuf;
use thiserror::Error;

/// The ways in which loading vehicles or aggregating events can fail.
///
/// None of these are recovered from locally: the file being processed is abandoned and the error
/// is passed back to the caller.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// A file could not be opened, decompressed or read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// The file being read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed XML.
    #[error("Malformed XML at byte {position}: {message}")]
    Parse {
        /// Byte offset into the decompressed stream
        position: u64,
        /// Description of the problem
        message: String,
    },

    /// An element of interest is missing a required attribute or has an invalid value.
    #[error("Invalid data in element at byte {position}: {message}")]
    Data {
        /// Byte offset of the offending element in the decompressed stream
        position: u64,
        /// Description of the problem
        message: String,
    },
}

impl ProcessingError {
    /// Create a new [`ProcessingError::Data`]
    pub fn data(position: u64, message: impl Into<String>) -> Self {
        Self::Data {
            position,
            message: message.into(),
        }
    }
}

/// Convenience alias used by the loading and aggregation code.
pub type ProcessingResult<T> = std::result::Result<T, ProcessingError>;
