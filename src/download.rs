//! Image retrieval into a working directory.

use crate::{Error, Result};
use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::header::REFERER;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "png", "gif", "webp"];

/// Settings for [`download_images`]
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    pub user_agent: String,
    /// Sent as the `Referer` header; many image hosts refuse hotlinks without it
    pub referer: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            user_agent: crate::EngineConfig::default().user_agent,
            referer: None,
        }
    }
}

/// File name for the `index`-th (0-based) image: `001.jpg`, `002.png`, ...
pub fn page_file_name(index: usize, url: &str) -> String {
    format!("{:03}.{}", index + 1, image_extension(url))
}

fn image_extension(url: &str) -> &'static str {
    let ext = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(str::to_string))
        })
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()));

    match ext.as_deref() {
        Some("jpeg") => "jpg",
        Some(e) => KNOWN_EXTENSIONS.iter().copied().find(|k| *k == e).unwrap_or("jpg"),
        None => "jpg",
    }
}

/// Download `urls` into `dir` as numbered files.
///
/// Numbering follows the position in `urls`, so a failed download leaves a
/// gap instead of shifting later pages. Failures are logged and skipped; the
/// returned paths are the files actually written, in list order.
pub fn download_images(urls: &[String], dir: &Path, config: &DownloadConfig) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let client = Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;

    let mut written = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        let name = page_file_name(i, url);
        let path = dir.join(&name);

        match fetch(&client, url, config.referer.as_deref()) {
            Ok(bytes) => {
                std::fs::write(&path, &bytes)?;
                info!("  Downloaded {}/{}: {}", i + 1, urls.len(), name);
                written.push(path);
            }
            Err(e) => warn!("  Error downloading {}: {}", url, e),
        }
    }

    Ok(written)
}

fn fetch(client: &Client, url: &str, referer: Option<&str>) -> Result<Vec<u8>> {
    let mut req = client.get(url);
    if let Some(referer) = referer {
        req = req.header(REFERER, referer);
    }
    let res = req.send()?.error_for_status()?;
    Ok(res.bytes()?.to_vec())
}
