//! Top-level error returned by [`crate::Downloader`] operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::download::DownloadError;

/// Failure of a download or batch operation.
///
/// Callers usually care about two outcomes: the link could not be turned into
/// a download ([`GdlError::InvalidUrl`]) or the transfer did not complete
/// ([`GdlError::DownloadFailed`]).
#[derive(Debug, Error)]
pub enum GdlError {
    /// The host is not a Drive host or no file identifier could be extracted.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Retries were exhausted or the output could not be written.
    #[error("download of {url} failed after {attempts} attempt(s)")]
    DownloadFailed {
        /// The share link being downloaded.
        url: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// The error from the last attempt.
        #[source]
        source: DownloadError,
    },

    /// The configuration is out of range.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The batch URL list could not be read or the output directory created.
    #[error("cannot use batch input {path}")]
    BatchInput {
        /// The offending path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl GdlError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason,
        }
    }

    /// Creates a terminal download failure.
    pub fn download_failed(url: impl Into<String>, attempts: u32, source: DownloadError) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates a batch input error.
    pub fn batch_input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::BatchInput {
            path: path.into(),
            source,
        }
    }
}
