//! HTTP client wrapper for Drive requests.
//!
//! One [`HttpClient`] is built per [`crate::Downloader`] and reused for every
//! request it makes. The cookie store carries the Drive session between the
//! interstitial page and the confirmed download.

use reqwest::header::RANGE;
use reqwest::{Client, Method, Response};
use tracing::{debug, instrument};

use super::error::DownloadError;
use crate::config::Config;
use crate::user_agent;

/// HTTP client configured from a [`Config`].
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client honoring `timeout` and `verify_ssl`.
    ///
    /// The timeout bounds connecting and each read, not the whole transfer.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error when the TLS backend cannot be initialized.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .gzip(true)
            .cookie_store(true)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Sends a GET, optionally with a `Range` header.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Timeout`], [`DownloadError::Network`] or, for
    /// non-success statuses, [`DownloadError::HttpStatus`].
    #[instrument(level = "debug", skip(self))]
    pub async fn get(&self, url: &str, range: Option<&str>) -> Result<Response, DownloadError> {
        self.send_request(Method::GET, url, range).await
    }

    /// Sends a HEAD request.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get`].
    #[instrument(level = "debug", skip(self))]
    pub async fn head(&self, url: &str) -> Result<Response, DownloadError> {
        self.send_request(Method::HEAD, url, None).await
    }

    async fn send_request(
        &self,
        method: Method,
        url: &str,
        range_header: Option<&str>,
    ) -> Result<Response, DownloadError> {
        let mut request = self.client.request(method, url);
        if let Some(range) = range_header {
            request = request.header(RANGE, range);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        debug!(status = status.as_u16(), final_url = %response.url(), "response received");
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }
}
