//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Download files from Google Drive and export Google Docs.
///
/// Accepts any share link shape (`/file/d/<id>`, `open?id=`, `uc?id=`,
/// Docs/Sheets/Slides edit links) and handles the large-file warning page.
#[derive(Parser, Debug)]
#[command(name = "gdl")]
#[command(author, version, about)]
#[command(group(ArgGroup::new("source").required(true).args(["url", "batch"])))]
pub struct Args {
    /// Share link of the file to download
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Text file with one share link per line (`#` starts a comment)
    #[arg(long, value_name = "FILE")]
    pub batch: Option<PathBuf>,

    /// Output file for single downloads
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output directory for batch mode (default from config) or --auto-name (default `.`)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Export format for Google Docs, Sheets and Slides (pdf, docx, xlsx, csv, ...)
    #[arg(long, value_name = "FMT")]
    pub format: Option<String>,

    /// Continue a partially downloaded file
    #[arg(long)]
    pub resume: bool,

    /// Name the output file after the server-suggested filename
    #[arg(long)]
    pub auto_name: bool,

    /// Configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress progress output and non-error logs
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
