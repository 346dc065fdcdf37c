//! Extraction orchestrator: navigate, stabilize, collect, release.

use crate::cancel::CancelToken;
use crate::collector::{collect_page_images_with_cancel, PageImageSet};
use crate::trigger::{trigger_lazy_load, Clock, SystemClock};
use crate::{Engine, EngineConfig, RenderedDocument, Result};
use log::{info, warn};
use std::sync::Arc;

pub(crate) type ProgressHandler = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Progress of one extraction, reported as it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The page finished loading
    Navigated { url: String },
    /// Lazy-load stabilization finished
    Stabilized {
        url: String,
        polls: u32,
        height: u64,
        stabilized: bool,
    },
    /// Page images were collected
    Collected { url: String, count: usize },
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::Navigated { url } => write!(f, "Scraping: {}", url),
            Progress::Stabilized {
                polls,
                height,
                stabilized,
                ..
            } => {
                if *stabilized {
                    write!(f, "  Page settled after {} polls (height {})", polls, height)
                } else {
                    write!(f, "  Gave up waiting after {} polls (height {})", polls, height)
                }
            }
            Progress::Collected { count, .. } => write!(f, "  Found {} images", count),
        }
    }
}

/// Runs page extractions against one rendering backend.
///
/// The extractor holds configuration only; every call to
/// [`Extractor::extract`] opens its own document and closes it before
/// returning, so calls are independent of each other.
pub struct Extractor<E: Engine> {
    engine: E,
    config: EngineConfig,
    clock: Arc<dyn Clock + Send + Sync>,
    on_progress: Option<ProgressHandler>,
}

impl<E: Engine> Extractor<E> {
    /// Create the backend from `config` and wrap it.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let engine = E::new(config.clone())?;
        Ok(Self::with_engine(engine, config))
    }

    pub fn with_engine(engine: E, config: EngineConfig) -> Self {
        Self {
            engine,
            config,
            clock: Arc::new(SystemClock),
            on_progress: None,
        }
    }

    /// Replace the clock used for settle pauses.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a callback invoked for every [`Progress`] event.
    pub fn on_progress<F>(&mut self, cb: F)
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(cb));
    }

    pub(crate) fn set_progress_handler(&mut self, handler: Option<ProgressHandler>) {
        self.on_progress = handler;
    }

    /// Remove previously registered progress callback if any
    pub fn clear_on_progress(&mut self) {
        self.on_progress = None;
    }

    /// Extract the ordered page image URLs of `url`.
    pub fn extract(&self, url: &str) -> Result<Vec<String>> {
        self.extract_with_cancel(url, &CancelToken::new())
    }

    /// Extract `url`, aborting once `cancel` fires.
    ///
    /// Every failure, cancellation included, comes back as
    /// `Error::Extraction` for `url`; a partial image list is never returned.
    pub fn extract_with_cancel(&self, url: &str, cancel: &CancelToken) -> Result<Vec<String>> {
        self.run(url, cancel)
            .map(PageImageSet::into_strings)
            .map_err(|e| e.for_page(url))
    }

    fn run(&self, url: &str, cancel: &CancelToken) -> Result<PageImageSet> {
        self.config.scope.validate()?;
        cancel.check()?;

        let mut doc = self.engine.navigate(url)?;
        self.emit(Progress::Navigated { url: url.to_string() });

        let result = self.drive(&mut doc, url, cancel);
        let closed = doc.close();

        let images = result?;
        if let Err(e) = closed {
            warn!("Failed to close document for {}: {}", url, e);
        }
        Ok(images)
    }

    fn drive(&self, doc: &mut E::Document, url: &str, cancel: &CancelToken) -> Result<PageImageSet> {
        let settled = trigger_lazy_load(doc, &self.config.stability, self.clock.as_ref(), cancel)?;
        self.emit(Progress::Stabilized {
            url: url.to_string(),
            polls: settled.polls,
            height: settled.final_height,
            stabilized: settled.stabilized,
        });

        cancel.check()?;
        let snapshot = doc.snapshot(&self.config.scope)?;
        let images = collect_page_images_with_cancel(&snapshot, &self.config.scope, cancel)?;
        self.emit(Progress::Collected {
            url: url.to_string(),
            count: images.len(),
        });
        Ok(images)
    }

    fn emit(&self, progress: Progress) {
        info!("{}", progress);
        if let Some(cb) = &self.on_progress {
            cb(&progress);
        }
    }
}
