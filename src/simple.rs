//! A lightweight, browser-less engine that fetches HTML and parses it.
//!
//! This engine performs an HTTP GET and parses the response into a
//! [`StaticDocument`]. No scripts run, so nothing lazy-loads: scrolling is a
//! no-op and the height never changes, which lets stabilization finish after
//! the threshold polls. Pages that only reveal their images through
//! JavaScript need the CDP backend; `data-src`, `srcset` and `<noscript>`
//! fallbacks are still picked up here.

use crate::dom::{DomQuery, ScopeRule, StaticDocument};
use crate::snapshot::PageSnapshot;
use crate::{Engine, EngineConfig, Error, RenderedDocument, Result, Scrollable};
use reqwest::blocking::Client;
use std::time::Duration;
use url::Url;

/// A simple, dependency-light engine that does not run JavaScript.
pub struct SimpleEngine {
    client: Client,
    config: EngineConfig,
}

impl Engine for SimpleEngine {
    type Document = StaticDocument;

    fn new(config: EngineConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn navigate(&self, url: &str) -> Result<StaticDocument> {
        let res = self
            .client
            .get(url)
            .header("User-Agent", self.config.user_agent.clone())
            .send()
            .map_err(|e| Error::LoadError(format!("HTTP GET failed: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::LoadError(format!("HTTP GET failed: {}", e)))?;

        let base_url = res.url().clone();
        let body = res
            .text()
            .map_err(|e| Error::LoadError(format!("Failed to read response body: {}", e)))?;

        Ok(StaticDocument::from_html(&body, base_url))
    }
}

impl Scrollable for StaticDocument {
    fn read_height(&mut self) -> Result<u64> {
        Ok(0)
    }

    fn scroll_to(&mut self, _offset: u64) -> Result<()> {
        Ok(())
    }
}

impl RenderedDocument for StaticDocument {
    fn base_url(&self) -> &Url {
        DomQuery::base_url(self)
    }

    fn snapshot(&mut self, rule: &ScopeRule) -> Result<PageSnapshot> {
        PageSnapshot::capture(self, rule)
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}
