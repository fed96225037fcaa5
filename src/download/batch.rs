//! Batch mode: download every link listed in a text file.
//!
//! Items are processed one after another. A failing item is recorded and the
//! batch moves on; only an unreadable list file aborts the whole batch.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use super::engine::{DownloadOutcome, DownloadRequest, Downloader};
use crate::GdlError;

/// Input for [`Downloader::batch_download`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// Text file with one link per line.
    pub urls_file: PathBuf,
    /// Directory receiving the auto-named files.
    pub output_dir: PathBuf,
    /// Export format applied to every item.
    pub export_format: Option<String>,
    /// Resume partial files left by an earlier run.
    pub resume: bool,
}

/// One item that did not download.
#[derive(Debug)]
pub struct BatchFailure {
    /// The link as written in the list.
    pub url: String,
    /// Why it failed.
    pub error: GdlError,
}

/// Tally of a finished batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Links found in the list.
    pub total: usize,
    /// Files written, in list order.
    pub succeeded: Vec<PathBuf>,
    /// Items that failed, in list order.
    pub failed: Vec<BatchFailure>,
}

impl BatchSummary {
    /// Number of successful items.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Number of failed items.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when no item failed.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Links in a list file: trimmed, skipping blank lines and `#` comments.
#[must_use]
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

impl Downloader {
    /// Downloads every link in `request.urls_file` into `request.output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GdlError::BatchInput`] when the list cannot be read or the
    /// output directory cannot be created. Per-item failures are reported in
    /// the summary instead.
    #[instrument(skip(self, request), fields(urls_file = %request.urls_file.display()))]
    pub async fn batch_download(&self, request: &BatchRequest) -> Result<BatchSummary, GdlError> {
        let contents = tokio::fs::read_to_string(&request.urls_file)
            .await
            .map_err(|e| GdlError::batch_input(&request.urls_file, e))?;
        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| GdlError::batch_input(&request.output_dir, e))?;

        let urls = parse_url_list(&contents);
        let mut summary = BatchSummary {
            total: urls.len(),
            ..BatchSummary::default()
        };
        info!(count = urls.len(), output_dir = %request.output_dir.display(), "starting batch");

        for (index, url) in urls.into_iter().enumerate() {
            info!(item = index + 1, total = summary.total, url = %url, "batch item");
            match self.download_batch_item(&url, request).await {
                Ok(outcome) => summary.succeeded.push(outcome.path),
                Err(error) => {
                    warn!(
                        url = %url,
                        error = &error as &dyn std::error::Error,
                        "batch item failed"
                    );
                    summary.failed.push(BatchFailure { url, error });
                }
            }
        }

        info!(
            succeeded = summary.succeeded_count(),
            failed = summary.failed_count(),
            "batch finished"
        );
        Ok(summary)
    }

    async fn download_batch_item(
        &self,
        url: &str,
        request: &BatchRequest,
    ) -> Result<DownloadOutcome, GdlError> {
        let output = self
            .suggest_output_path(url, request.export_format.as_deref(), &request.output_dir)
            .await?;
        let item = DownloadRequest::new(url, output)
            .with_format(request.export_format.clone())
            .with_resume(request.resume);
        self.download(&item).await
    }
}
