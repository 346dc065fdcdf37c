//! URL list parsing and the extract, download, bind loop over it.

use crate::cancel::CancelToken;
use crate::download::{download_images, DownloadConfig};
use crate::extract::Extractor;
use crate::pdf::create_pdf;
use crate::{Engine, Result};
use log::{info, warn};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name used when a list line carries no `| Name` part
pub const DEFAULT_NAME: &str = "comic";

/// One line of a URL list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub url: String,
    pub name: String,
}

/// Parse a URL list.
///
/// One entry per line as `URL | Name` or a bare `URL`. Blank lines and lines
/// starting with `#` are ignored.
pub fn parse_url_list(text: &str) -> Vec<BatchEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once('|') {
            Some((url, name)) => BatchEntry {
                url: url.trim().to_string(),
                name: name.trim().to_string(),
            },
            None => BatchEntry {
                url: line.to_string(),
                name: DEFAULT_NAME.to_string(),
            },
        })
        .collect()
}

pub fn read_url_list(path: &Path) -> Result<Vec<BatchEntry>> {
    Ok(parse_url_list(&std::fs::read_to_string(path)?))
}

fn invalid_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("static regex"))
}

/// Make `name` safe to use as a file name on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    invalid_filename_chars()
        .replace_all(name, "_")
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string()
}

/// Settings for [`run_batch`]
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Where finished PDFs (and the per-entry scratch directories) go
    pub output_dir: PathBuf,
    pub download: DownloadConfig,
    pub cancel: CancelToken,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            download: DownloadConfig::default(),
            cancel: CancelToken::new(),
        }
    }
}

/// What a batch produced
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Written PDFs, in input order
    pub succeeded: Vec<PathBuf>,
    /// `(url, reason)` for every entry that produced no PDF
    pub skipped: Vec<(String, String)>,
}

/// Turn every entry into `<output_dir>/<sanitized name>.pdf`.
///
/// A failing entry is logged and skipped. Cancellation stops the batch and
/// marks the remaining entries as skipped.
pub fn run_batch<E: Engine>(extractor: &Extractor<E>, entries: &[BatchEntry], options: &BatchOptions) -> BatchSummary {
    let mut summary = BatchSummary::default();
    info!("Processing {} URL(s)...", entries.len());

    for entry in entries {
        if options.cancel.is_cancelled() {
            summary.skipped.push((entry.url.clone(), "cancelled".to_string()));
            continue;
        }

        let mut file_name = sanitize_filename(&entry.name);
        if file_name.is_empty() {
            file_name = DEFAULT_NAME.to_string();
        }
        info!("Processing: {} -> {}.pdf", entry.url, file_name);

        match process_entry(extractor, entry, &file_name, options) {
            Ok(path) => {
                info!("  Success: {}", path.display());
                summary.succeeded.push(path);
            }
            Err(reason) => {
                warn!("  Skipping {}: {}", entry.url, reason);
                summary.skipped.push((entry.url.clone(), reason));
            }
        }
    }

    info!(
        "Done: {} written, {} skipped",
        summary.succeeded.len(),
        summary.skipped.len()
    );
    summary
}

fn process_entry<E: Engine>(
    extractor: &Extractor<E>,
    entry: &BatchEntry,
    file_name: &str,
    options: &BatchOptions,
) -> std::result::Result<PathBuf, String> {
    let urls = extractor
        .extract_with_cancel(&entry.url, &options.cancel)
        .map_err(|e| e.to_string())?;
    if urls.is_empty() {
        return Err("no images found".to_string());
    }

    std::fs::create_dir_all(&options.output_dir).map_err(|e| e.to_string())?;
    // Removed when dropped, on every exit path.
    let scratch = tempfile::Builder::new()
        .prefix("tmp_")
        .tempdir_in(&options.output_dir)
        .map_err(|e| format!("failed to create temporary directory: {}", e))?;

    let download = DownloadConfig {
        referer: options.download.referer.clone().or_else(|| Some(entry.url.clone())),
        ..options.download.clone()
    };
    let files = download_images(&urls, scratch.path(), &download).map_err(|e| e.to_string())?;
    if files.is_empty() {
        return Err("failed to download images".to_string());
    }

    let output = options.output_dir.join(format!("{}.pdf", file_name));
    create_pdf(&files, &output).map_err(|e| e.to_string())
}
