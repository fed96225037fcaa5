//! Download engine for Google Drive files.
//!
//! # Features
//!
//! - Streaming writes in `chunk_size` pieces, never buffering whole files
//! - Large-file confirmation page handling
//! - Exponential backoff on transient failures
//! - `Range` resume from partial files
//! - Server-suggested filenames for batch and auto-named downloads
//!
//! # Example
//!
//! ```no_run
//! use gdl_core::download::{BatchRequest, Downloader};
//! use gdl_core::Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(Config::default())?;
//! let summary = downloader
//!     .batch_download(&BatchRequest {
//!         urls_file: "links.txt".into(),
//!         output_dir: "./downloads".into(),
//!         export_format: None,
//!         resume: true,
//!     })
//!     .await?;
//! println!("{}/{} downloaded", summary.succeeded_count(), summary.total);
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
mod engine;
mod error;
mod filename;
mod progress;
mod retry;

pub use batch::{BatchFailure, BatchRequest, BatchSummary, parse_url_list};
pub use client::HttpClient;
pub use engine::{DownloadOutcome, DownloadRequest, Downloader};
pub use error::DownloadError;
pub use progress::{TransferState, estimate_eta, format_bytes, format_speed};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
