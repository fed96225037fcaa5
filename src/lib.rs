//! Google Drive downloader library
//!
//! Downloads publicly shared Google Drive files and exports Google Docs,
//! Sheets and Slides, handling the large-file confirmation page along the way.
//!
//! # Architecture
//!
//! - [`drive`] - link parsing, export formats and confirmation page detection
//! - [`download`] - HTTP session, retry policy, streaming engine and batch mode
//! - [`config`] - layered settings from JSON files, `GDL_*` variables and overrides
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> Result<(), gdl_core::GdlError> {
//! let outcome = gdl_core::download(
//!     "https://drive.google.com/file/d/1AbCdEf/view?usp=sharing",
//!     "report.pdf",
//! )
//! .await?;
//! println!("saved {}", outcome.path.display());
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::Path;

pub mod config;
pub mod download;
pub mod drive;
mod error;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{Config, ConfigError, ConfigOverrides, LoadedConfig, LogLevel};
pub use download::{
    BatchFailure, BatchRequest, BatchSummary, DownloadError, DownloadOutcome, DownloadRequest,
    Downloader, RetryPolicy,
};
pub use drive::{extract_file_id, validate_url};
pub use error::GdlError;

/// Downloads one file using configuration from the default search path and environment.
///
/// # Errors
///
/// Same as [`Downloader::download`], plus [`GdlError::Config`] when the loaded
/// configuration is invalid.
pub async fn download(url: &str, output: impl AsRef<Path>) -> Result<DownloadOutcome, GdlError> {
    let loaded = Config::load(None, &ConfigOverrides::default())?;
    for warning in &loaded.warnings {
        tracing::warn!("{warning}");
    }
    let downloader = Downloader::new(loaded.config)?;
    downloader
        .download(&DownloadRequest::new(url, output.as_ref()))
        .await
}
