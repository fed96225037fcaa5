//! Download engine: one file, sequential attempts, resumable.
//!
//! [`Downloader::download`] turns a share link into a direct download URL,
//! follows the large-file confirmation page when Drive serves one, and streams
//! the body to disk. Failed attempts are retried with exponential backoff;
//! when resuming, every attempt continues from whatever is already on disk.
//!
//! # Example
//!
//! ```no_run
//! use gdl_core::{Config, DownloadRequest, Downloader};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(Config::default())?;
//! let request = DownloadRequest::new(
//!     "https://drive.google.com/file/d/1AbCdEf/view?usp=sharing",
//!     "./downloads/dataset.zip",
//! )
//! .with_resume(true);
//! let outcome = downloader.download(&request).await?;
//! println!("{} bytes in {}", outcome.total_bytes, outcome.path.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::client::HttpClient;
use super::error::DownloadError;
use super::filename::{fallback_filename, filename_from_headers};
use super::progress::{TransferProgress, TransferState};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use crate::GdlError;
use crate::config::Config;
use crate::drive::{
    Endpoints, export_format_for_path, extract_confirm_token, extract_file_id, is_docs_url,
    is_interstitial, validate_url,
};

const UNRECOGNIZED_HOST: &str = "not a Google Drive or Google Docs link";
const NO_FILE_ID: &str = "no file identifier found in link";

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Share link on drive.google.com or docs.google.com.
    pub url: String,
    /// Destination file.
    pub output: PathBuf,
    /// Export format for Docs links; detected from `output` when absent.
    pub export_format: Option<String>,
    /// Continue from an existing partial file instead of overwriting it.
    pub resume: bool,
}

impl DownloadRequest {
    /// Creates a request with no export format and resume disabled.
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            export_format: None,
            resume: false,
        }
    }

    /// Sets an explicit export format.
    #[must_use]
    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.export_format = format;
        self
    }

    /// Enables or disables resuming.
    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// File the bytes were written to.
    pub path: PathBuf,
    /// Bytes written by the successful attempt.
    pub bytes_written: u64,
    /// Size of the file on disk when done.
    pub total_bytes: u64,
    /// Whether the successful attempt continued an existing partial file.
    pub resumed: bool,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall time across all attempts, including backoff waits.
    pub elapsed: Duration,
    /// Drive served its confirmation page without a usable token; the file
    /// holds that page rather than the requested content.
    pub confirmation_unresolved: bool,
}

/// What a single successful attempt produced.
#[derive(Debug)]
struct AttemptOutcome {
    bytes_written: u64,
    total_bytes: u64,
    resumed: bool,
    confirmation_unresolved: bool,
}

/// Body to be written for one attempt.
enum Payload {
    /// Streamed straight from the response.
    Stream(Response),
    /// Already read into memory while checking for the confirmation page.
    Buffered { status: StatusCode, body: Vec<u8> },
}

impl Payload {
    fn status(&self) -> StatusCode {
        match self {
            Self::Stream(response) => response.status(),
            Self::Buffered { status, .. } => *status,
        }
    }

    fn content_length(&self) -> Option<u64> {
        match self {
            Self::Stream(response) => response.content_length(),
            Self::Buffered { body, .. } => Some(body.len() as u64),
        }
    }
}

/// Per-download values shared by all attempts.
struct Transfer<'a> {
    file_id: String,
    download_url: String,
    output: &'a Path,
    resume: bool,
    label: String,
}

/// Downloads Drive files one at a time.
///
/// Holds the immutable [`Config`] and a reusable HTTP session.
#[derive(Debug, Clone)]
pub struct Downloader {
    config: Config,
    client: HttpClient,
    retry_policy: RetryPolicy,
    endpoints: Endpoints,
    show_progress: bool,
}

impl Downloader {
    /// Creates a downloader for the production Drive endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`GdlError::Config`] when `config` fails validation and
    /// [`GdlError::Client`] when the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, GdlError> {
        config.validate()?;
        let client = HttpClient::from_config(&config).map_err(GdlError::Client)?;
        Ok(Self {
            retry_policy: RetryPolicy::from_config(&config),
            config,
            client,
            endpoints: Endpoints::default(),
            show_progress: false,
        })
    }

    /// Sends requests to `endpoints` instead of the production hosts.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Shows a terminal progress bar while downloading.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// The configuration this downloader was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Downloads one file, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns [`GdlError::InvalidUrl`] when the link is not a Drive link or
    /// carries no file identifier, and [`GdlError::DownloadFailed`] when
    /// attempts are exhausted or the output cannot be written.
    #[instrument(skip(self, request), fields(url = %request.url, output = %request.output.display()))]
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadOutcome, GdlError> {
        if !validate_url(&request.url) {
            return Err(GdlError::invalid_url(&request.url, UNRECOGNIZED_HOST));
        }
        let file_id = extract_file_id(&request.url)
            .ok_or_else(|| GdlError::invalid_url(&request.url, NO_FILE_ID))?;

        let export_format = request.export_format.clone().or_else(|| {
            is_docs_url(&request.url)
                .then(|| export_format_for_path(&request.output))
                .flatten()
                .map(str::to_string)
        });
        if let Some(format) = &export_format {
            debug!(format, "requesting export");
        }

        let transfer = Transfer {
            download_url: self.endpoints.download_url(&file_id, export_format.as_deref()),
            file_id,
            output: &request.output,
            resume: request.resume,
            label: request
                .output
                .file_name()
                .map_or_else(|| request.url.clone(), |name| name.to_string_lossy().into_owned()),
        };

        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, download_url = %transfer.download_url, "attempting download");

            match self.attempt(&transfer).await {
                Ok(done) => {
                    info!(
                        path = %request.output.display(),
                        bytes = done.total_bytes,
                        resumed = done.resumed,
                        attempts = attempt,
                        "download complete"
                    );
                    return Ok(DownloadOutcome {
                        path: request.output.clone(),
                        bytes_written: done.bytes_written,
                        total_bytes: done.total_bytes,
                        resumed: done.resumed,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        confirmation_unresolved: done.confirmation_unresolved,
                    });
                }
                Err(e) => match self.retry_policy.should_retry(classify_error(&e), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        warn!(
                            url = %request.url,
                            attempt = next_attempt,
                            max_attempts = self.retry_policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = &e as &dyn std::error::Error,
                            "retrying download"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url = %request.url, %reason, "not retrying download");
                        return Err(GdlError::download_failed(&request.url, attempt, e));
                    }
                },
            }
        }
    }

    /// Picks an output path inside `dir` for `url`.
    ///
    /// Uses the server-suggested filename from a HEAD request, falling back to
    /// `<file id><ext>` when the server offers none or the request fails.
    ///
    /// # Errors
    ///
    /// Returns [`GdlError::InvalidUrl`] when no file identifier can be extracted.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn suggest_output_path(
        &self,
        url: &str,
        export_format: Option<&str>,
        dir: &Path,
    ) -> Result<PathBuf, GdlError> {
        if !validate_url(url) {
            return Err(GdlError::invalid_url(url, UNRECOGNIZED_HOST));
        }
        let file_id = extract_file_id(url).ok_or_else(|| GdlError::invalid_url(url, NO_FILE_ID))?;
        let download_url = self.endpoints.download_url(&file_id, export_format);

        let suggested = match self.client.head(&download_url).await {
            Ok(response) => filename_from_headers(response.headers()),
            Err(e) => {
                debug!(error = %e, "HEAD request failed, using fallback filename");
                None
            }
        };
        let name = suggested.unwrap_or_else(|| fallback_filename(&file_id, export_format));
        debug!(filename = %name, "resolved output filename");
        Ok(dir.join(name))
    }

    async fn attempt(&self, transfer: &Transfer<'_>) -> Result<AttemptOutcome, DownloadError> {
        let existing = if transfer.resume {
            existing_len(transfer.output).await
        } else {
            0
        };
        let range = (existing > 0).then(|| format!("bytes={existing}-"));
        if let Some(range) = &range {
            debug!(%range, "resuming partial file");
        }

        let already_complete = AttemptOutcome {
            bytes_written: 0,
            total_bytes: existing,
            resumed: true,
            confirmation_unresolved: false,
        };

        let Some(response) = self
            .get_ranged(&transfer.download_url, range.as_deref())
            .await?
        else {
            info!(bytes = existing, "partial file already complete");
            return Ok(already_complete);
        };

        let Some((payload, confirmation_unresolved)) = self
            .resolve_confirmation(response, transfer, range.as_deref())
            .await?
        else {
            info!(bytes = existing, "partial file already complete");
            return Ok(already_complete);
        };

        let append = existing > 0 && payload.status() == StatusCode::PARTIAL_CONTENT;
        if existing > 0 && !append {
            warn!(
                status = payload.status().as_u16(),
                "server ignored range request, restarting from the beginning"
            );
        }
        let offset = if append { existing } else { 0 };

        let file = open_output(transfer.output, append, self.config.auto_create_dirs).await?;
        let mut state = TransferState::new(offset, payload.content_length().map(|len| offset + len));
        let progress = TransferProgress::start(self.show_progress, &transfer.label, &state);
        let mut writer = BufWriter::with_capacity(self.config.chunk_size, file);

        let url = transfer.download_url.as_str();
        let written = match payload {
            Payload::Stream(response) => {
                let stream = response.bytes_stream();
                stream_to_file(&mut writer, stream, url, transfer.output, &mut state, &progress)
                    .await
            }
            Payload::Buffered { body, .. } => {
                let stream = futures_util::stream::iter([Ok::<_, reqwest::Error>(body)]);
                stream_to_file(&mut writer, stream, url, transfer.output, &mut state, &progress)
                    .await
            }
        };
        progress.finish();
        let bytes_written = written?;

        debug!(
            bytes_written,
            elapsed_ms = state.elapsed().as_millis(),
            "attempt finished"
        );
        Ok(AttemptOutcome {
            bytes_written,
            total_bytes: state.bytes_written(),
            resumed: append,
            confirmation_unresolved,
        })
    }

    /// GET that treats `416 Range Not Satisfiable` on a ranged request as
    /// "nothing left to fetch" and returns `None`.
    async fn get_ranged(
        &self,
        url: &str,
        range: Option<&str>,
    ) -> Result<Option<Response>, DownloadError> {
        match self.client.get(url, range).await {
            Ok(response) => Ok(Some(response)),
            Err(DownloadError::HttpStatus { status: 416, .. }) if range.is_some() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replaces the warning page with the confirmed download when Drive serves one.
    ///
    /// Only HTML responses are read into memory; anything else is the file itself.
    /// Returns `None` when the confirmed ranged request reports the file complete.
    async fn resolve_confirmation(
        &self,
        response: Response,
        transfer: &Transfer<'_>,
        range: Option<&str>,
    ) -> Result<Option<(Payload, bool)>, DownloadError> {
        if !is_html(&response) {
            return Ok(Some((Payload::Stream(response), false)));
        }

        let final_url = response.url().to_string();
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::from_reqwest(&transfer.download_url, e))?
            .to_vec();
        let text = String::from_utf8_lossy(&body);

        if !is_interstitial(&final_url, &text) {
            return Ok(Some((Payload::Buffered { status, body }, false)));
        }

        if let Some(token) = extract_confirm_token(&text) {
            debug!("confirmation page detected, following token");
            let confirm_url = self.endpoints.confirm_url(&transfer.file_id, &token);
            let confirmed = self.get_ranged(&confirm_url, range).await?;
            return Ok(confirmed.map(|response| (Payload::Stream(response), false)));
        }

        if self.config.strict_confirmation {
            return Err(DownloadError::confirmation_token_missing(
                &transfer.download_url,
            ));
        }

        warn!(
            url = %transfer.download_url,
            "confirmation page carried no token, saving the page as returned"
        );
        Ok(Some((Payload::Buffered { status, body }, true)))
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"))
}

async fn existing_len(path: &Path) -> u64 {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0)
}

/// Opens the destination for appending or truncating, creating parent directories on request.
async fn open_output(path: &Path, append: bool, create_dirs: bool) -> Result<File, DownloadError> {
    if create_dirs
        && let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    let opened = if append {
        OpenOptions::new().create(true).append(true).open(path).await
    } else {
        File::create(path).await
    };
    opened.map_err(|e| DownloadError::io(path, e))
}

/// Streams chunks into `writer`, returning bytes written.
///
/// On a broken stream the bytes received so far are flushed before the error
/// is returned so a resumed attempt can continue from them.
async fn stream_to_file<S, B>(
    writer: &mut BufWriter<File>,
    stream: S,
    url: &str,
    path: &Path,
    state: &mut TransferState,
    progress: &TransferProgress,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, reqwest::Error>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                if let Err(flush_error) = writer.flush().await {
                    debug!(error = %flush_error, "flushing partial data failed");
                }
                return Err(DownloadError::from_reqwest(url, e));
            }
        };
        let chunk = chunk.as_ref();

        writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        bytes_written += chunk.len() as u64;
        let refreshed = state.record(chunk.len() as u64);
        progress.update(state, refreshed);
    }

    writer.flush().await.map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}
