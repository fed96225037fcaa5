//! Export format detection for Docs, Sheets and Slides downloads.

use std::path::Path;

/// Output extension to export format.
const EXTENSION_FORMATS: &[(&str, &str)] = &[
    ("pdf", "pdf"),
    ("docx", "docx"),
    ("doc", "docx"),
    ("xlsx", "xlsx"),
    ("xls", "xlsx"),
    ("csv", "csv"),
    ("tsv", "tsv"),
    ("pptx", "pptx"),
    ("ppt", "pptx"),
    ("txt", "txt"),
    ("html", "html"),
    ("odt", "odt"),
    ("ods", "ods"),
    ("odp", "odp"),
    ("rtf", "rtf"),
    ("epub", "epub"),
];

/// Maps the extension of `path` to an export format.
///
/// Returns `None` for unmapped or missing extensions, in which case the
/// service's default format applies.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use gdl_core::drive::export_format_for_path;
///
/// assert_eq!(export_format_for_path(Path::new("report.PDF")), Some("pdf"));
/// assert_eq!(export_format_for_path(Path::new("sheet.xls")), Some("xlsx"));
/// assert_eq!(export_format_for_path(Path::new("archive.zip")), None);
/// ```
#[must_use]
pub fn export_format_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    EXTENSION_FORMATS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, format)| *format)
}

/// File extension (with leading dot) used when naming an export of `format`.
///
/// Unknown or absent formats fall back to `.bin`.
#[must_use]
pub fn extension_for_format(format: Option<&str>) -> &'static str {
    let Some(format) = format else {
        return ".bin";
    };
    match format.to_ascii_lowercase().as_str() {
        "pdf" => ".pdf",
        "docx" => ".docx",
        "xlsx" => ".xlsx",
        "pptx" => ".pptx",
        "csv" => ".csv",
        "tsv" => ".tsv",
        "txt" => ".txt",
        "html" => ".html",
        "odt" => ".odt",
        "ods" => ".ods",
        "odp" => ".odp",
        "rtf" => ".rtf",
        "epub" => ".epub",
        _ => ".bin",
    }
}
