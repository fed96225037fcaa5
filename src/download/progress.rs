//! Transfer bookkeeping and terminal progress display.
//!
//! Progress is purely informational: nothing in the download path depends on
//! what is shown, and the bar is hidden entirely when disabled.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Window over which the instantaneous speed is measured.
const SPEED_WINDOW: Duration = Duration::from_millis(500);

const BYTE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

fn scale_bytes(mut value: f64) -> String {
    for unit in BYTE_UNITS {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} PB")
}

/// Human readable byte count, e.g. `1.5 KB`.
///
/// ```
/// use gdl_core::download::format_bytes;
///
/// assert_eq!(format_bytes(0), "0.0 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    scale_bytes(bytes as f64)
}

/// Human readable transfer rate, e.g. `2.0 MB/s`.
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", scale_bytes(bytes_per_sec.max(0.0)))
}

/// Estimated time remaining as `Ns`, `Nm Ns` or `Nh Nm`.
///
/// Returns `Unknown` when the speed or total size is not positive.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate_eta(downloaded: u64, total: u64, bytes_per_sec: f64) -> String {
    if bytes_per_sec <= 0.0 || total == 0 {
        return "Unknown".to_string();
    }
    let remaining = total.saturating_sub(downloaded) as f64;
    let eta = (remaining / bytes_per_sec) as u64;

    if eta < 60 {
        format!("{eta}s")
    } else if eta < 3600 {
        format!("{}m {}s", eta / 60, eta % 60)
    } else {
        format!("{}h {}m", eta / 3600, (eta % 3600) / 60)
    }
}

/// Byte counters for one download attempt.
#[derive(Debug, Clone)]
pub struct TransferState {
    bytes_written: u64,
    total_expected: Option<u64>,
    started: Instant,
    window_started: Instant,
    window_bytes: u64,
    speed: f64,
}

impl TransferState {
    /// Starts tracking. `already_on_disk` counts bytes kept from a previous attempt.
    #[must_use]
    pub fn new(already_on_disk: u64, total_expected: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            bytes_written: already_on_disk,
            total_expected,
            started: now,
            window_started: now,
            window_bytes: 0,
            speed: 0.0,
        }
    }

    /// Records `len` more bytes. Returns true when the speed sample was refreshed.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, len: u64) -> bool {
        self.bytes_written = self.bytes_written.saturating_add(len);
        self.window_bytes = self.window_bytes.saturating_add(len);

        let window = self.window_started.elapsed();
        if window < SPEED_WINDOW {
            return false;
        }
        self.speed = self.window_bytes as f64 / window.as_secs_f64();
        self.window_started = Instant::now();
        self.window_bytes = 0;
        true
    }

    /// Bytes on disk so far, including resumed bytes.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Expected final size, when the server announced one.
    #[must_use]
    pub fn total_expected(&self) -> Option<u64> {
        self.total_expected
    }

    /// Time since the attempt started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Most recent speed sample in bytes per second.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// `"<speed>, ETA <eta>"` summary for the progress bar.
    #[must_use]
    pub fn describe(&self) -> String {
        let eta = estimate_eta(
            self.bytes_written,
            self.total_expected.unwrap_or(0),
            self.speed,
        );
        format!("{}, ETA {eta}", format_speed(self.speed))
    }
}

/// Progress bar for a single file.
#[derive(Debug)]
pub(crate) struct TransferProgress {
    bar: ProgressBar,
}

impl TransferProgress {
    /// Creates a bar for `state`; a hidden bar when `visible` is false.
    pub(crate) fn start(visible: bool, label: &str, state: &TransferState) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = match state.total_expected() {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({msg})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {prefix} {bytes} ({msg})")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_prefix(label.to_string());
        bar.set_position(state.bytes_written());
        bar.set_message(state.describe());
        Self { bar }
    }

    pub(crate) fn update(&self, state: &TransferState, sample_refreshed: bool) {
        self.bar.set_position(state.bytes_written());
        if sample_refreshed {
            self.bar.set_message(state.describe());
        }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
