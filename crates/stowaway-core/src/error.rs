//! Error types for the stowaway-core library.
//!
//! This module provides comprehensive error handling using the `thiserror` crate,
//! with detailed error variants for different failure modes.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stowaway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all stowaway operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No embedded archive block was found in the carrier file
    #[error("archive not found: no embedded block in '{path}'")]
    ArchiveNotFound {
        /// Path to the carrier file that was scanned
        path: PathBuf,
    },

    /// An embedded block was found but its structure is invalid
    #[error("corrupt archive in '{path}': {details}")]
    CorruptArchive {
        /// Path to the carrier file holding the block
        path: PathBuf,
        /// Description of the structural violation
        details: String,
    },

    /// Neither the native decoder nor the external utility could decompress the payload
    #[error("cannot extract payload: native decode failed ({native}); external decode failed ({fallback})")]
    DecoderUnavailable {
        /// Why the native bzip2 decode failed
        native: String,
        /// Why the external bunzip2 fallback failed
        fallback: String,
    },

    /// The carrier already holds an embedded block
    #[error("carrier already contains an embedded block")]
    BlockPresent,

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove a file or directory during cleanup
    #[error("failed to remove '{path}': {source}")]
    Remove {
        /// Path that failed to remove
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to unpack archive members into the destination
    #[error("failed to unpack archive into '{path}': {source}")]
    Extraction {
        /// Destination directory of the failed unpack
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new archive-not-found error
    pub fn archive_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ArchiveNotFound { path: path.into() }
    }

    /// Creates a new corrupt-archive error
    pub fn corrupt_archive(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates a new decoder-unavailable error
    pub fn decoder_unavailable(native: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self::DecoderUnavailable {
            native: native.into(),
            fallback: fallback.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new removal error
    pub fn remove(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Remove {
            path: path.into(),
            source,
        }
    }

    /// Creates a new extraction error
    pub fn extraction(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Extraction {
            path: path.into(),
            source,
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error came from best-effort cleanup
    ///
    /// Cleanup failures are logged and swallowed by the install flow rather
    /// than aborting it.
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}
