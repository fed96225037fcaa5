//! Google Drive link handling.
//!
//! Everything here is pure string work: identifier extraction, host
//! validation, download URL templates, export format detection and the
//! confirmation-page token scraping. No network access happens in this module.

mod confirm;
mod export;
mod link;

pub use confirm::{extract_confirm_token, is_interstitial, url_requests_confirmation};
pub use export::{export_format_for_path, extension_for_format};
pub use link::{
    DOCS_HOST, DRIVE_HOST, Endpoints, build_confirm_url, build_download_url, extract_file_id,
    is_docs_url, validate_url,
};
