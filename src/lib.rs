//! webcomic2pdf
//!
//! Extracts the page images of a webcomic reader page and binds them into a
//! PDF. The core is page-image discovery: given a rendered reader page that
//! may lazy-load its images, hide them behind `srcset` variants, CSS
//! backgrounds or `<noscript>` fallbacks, produce the ordered, deduplicated
//! list of full-resolution image URLs in reading order.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives Chrome through the DevTools Protocol
//! - **Simple Backend**: plain HTTP fetch + HTML parse, no scripting
//! - **Pure collector**: extraction runs over the [`dom::DomQuery`]
//!   capability, so it can be tested against literal HTML
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pages = webcomic2pdf::extract_page_images("https://example.com/comic/ch-1", true)?;
//! for url in &pages {
//!     println!("{}", url);
//! }
//! # Ok(())
//! # }
//! ```

use url::Url;

pub mod error;
pub use error::{Error, Result};

pub mod cancel;
pub mod collector;
pub mod dom;
pub mod snapshot;
pub mod trigger;

pub mod extract;

// Chrome DevTools Protocol backend
#[cfg(feature = "cdp")]
pub mod cdp;

// HTTP + HTML parsing backend (no JS)
pub mod simple;

// Async-friendly facade running extractions on worker threads
pub mod async_api;

// Retrieval, document assembly and the batch driver around the core
pub mod batch;
pub mod download;
pub mod pdf;

pub use cancel::CancelToken;
pub use collector::{collect_page_images, ImageCandidate, PageImageSet};
pub use dom::{DomQuery, ScopeRule, StaticDocument};
pub use extract::{Extractor, Progress};
pub use snapshot::PageSnapshot;
pub use trigger::{Clock, Stabilization, StabilityPolicy, SystemClock};

/// Configuration for rendering and extracting a reader page
///
/// The defaults match common reader layouts: comic pages live under
/// `.reading-content`, each wrapped in a `.page-break` marker, and lazy
/// content gets 400 ms to appear after every scroll.
///
/// # Examples
///
/// ```
/// let cfg = webcomic2pdf::EngineConfig::default();
/// assert!(cfg.headless);
/// assert_eq!(cfg.stability.threshold, 8);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// User agent string to send with requests
    pub user_agent: String,
    /// Viewport dimensions
    pub viewport: Viewport,
    /// Run the browser without a visible window
    pub headless: bool,
    /// Keep Chrome's sandbox enabled
    pub sandbox: bool,
    /// Timeout for navigation and network quiescence in milliseconds
    pub timeout_ms: u64,
    /// How long the network must stay quiet before a page counts as loaded
    pub network_idle_ms: u64,
    /// Lazy-load stabilization tuning
    pub stability: StabilityPolicy,
    /// Which part of the page holds the comic
    pub scope: ScopeRule,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                .to_string(),
            viewport: Viewport::default(),
            headless: true,
            sandbox: false,
            timeout_ms: 30000,
            network_idle_ms: 500,
            stability: StabilityPolicy::default(),
            scope: ScopeRule::default(),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Scroll control over a rendered document
pub trait Scrollable {
    /// Current scroll-affecting layout height
    fn read_height(&mut self) -> Result<u64>;

    /// Force the vertical scroll position
    fn scroll_to(&mut self, offset: u64) -> Result<()>;
}

/// A loaded, scripted page owned by one extraction
pub trait RenderedDocument: Scrollable {
    /// URL relative references resolve against
    fn base_url(&self) -> &Url;

    /// Run the read-only scoped query step against the current DOM state.
    fn snapshot(&mut self, rule: &ScopeRule) -> Result<PageSnapshot>;

    /// Tear the document down and release its backend resources
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Core trait for rendering backends
pub trait Engine {
    type Document: RenderedDocument;

    /// Create a new engine instance with the given configuration
    fn new(config: EngineConfig) -> Result<Self>
    where
        Self: Sized;

    /// Load `url`, wait for the network to go quiet and hand back the page
    fn navigate(&self, url: &str) -> Result<Self::Document>;
}

/// Backend used by [`extract_page_images`]
#[cfg(feature = "cdp")]
pub type DefaultEngine = cdp::CdpEngine;

/// Backend used by [`extract_page_images`]
#[cfg(not(feature = "cdp"))]
pub type DefaultEngine = simple::SimpleEngine;

/// Create a new engine instance with the default backend
///
/// This prefers the CDP backend when the `cdp` feature is enabled (default);
/// otherwise the `SimpleEngine` is used.
pub fn new_engine(config: EngineConfig) -> Result<DefaultEngine> {
    DefaultEngine::new(config)
}

/// Extract the ordered page image URLs of the reader page at `url`.
///
/// Fails with [`Error::Extraction`] carrying `url` and the underlying cause
/// on any navigation or rendering error. An empty list is a valid result.
pub fn extract_page_images(url: &str, headless: bool) -> Result<Vec<String>> {
    let config = EngineConfig {
        headless,
        ..Default::default()
    };
    let engine = new_engine(config.clone()).map_err(|e| e.for_page(url))?;
    Extractor::with_engine(engine, config).extract(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert!(config.headless);
        assert_eq!(config.stability.settle_interval, Duration::from_millis(400));
        assert_eq!(config.scope.container, ".reading-content");
        assert_eq!(config.scope.page_break, ".page-break");
    }

    #[test]
    fn test_new_engine_accepts_headed_config() {
        let config = EngineConfig {
            headless: false,
            ..Default::default()
        };
        assert!(new_engine(config).is_ok());
    }
}
