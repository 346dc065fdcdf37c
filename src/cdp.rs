//! Chrome DevTools Protocol backend

use crate::dom::ScopeRule;
use crate::snapshot::{snapshot_script, PageSnapshot};
use crate::{Engine, EngineConfig, Error, RenderedDocument, Result, Scrollable};
use headless_chrome::browser::tab::Tab;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

const HEIGHT_SCRIPT: &str =
    "(document.body ? document.body.scrollHeight : document.documentElement.scrollHeight)";

const NETWORK_STATE_SCRIPT: &str =
    "document.readyState + ':' + performance.getEntriesByType('resource').length";

const NETWORK_POLL: Duration = Duration::from_millis(100);

/// CDP-based engine (uses the `headless_chrome` crate)
///
/// Every [`Engine::navigate`] call launches a dedicated Chrome instance with a
/// single tab, so concurrent extractions never share browser state. The
/// browser process goes away when the returned [`CdpDocument`] is closed or
/// dropped.
pub struct CdpEngine {
    config: EngineConfig,
}

impl CdpEngine {
    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(self.config.sandbox)
            .window_size(Some((self.config.viewport.width, self.config.viewport.height)))
            .idle_browser_timeout(Duration::from_millis(self.config.timeout_ms.max(30000) * 2))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))
    }
}

impl Engine for CdpEngine {
    type Document = CdpDocument;

    fn new(config: EngineConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let engine = Self { config };
        // Surface bad options before the first page, not during it.
        engine.launch_options()?;
        Ok(engine)
    }

    fn navigate(&self, url: &str) -> Result<CdpDocument> {
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let browser = Browser::new(self.launch_options()?)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(timeout);

        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;

        tab.navigate_to(url)
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        wait_for_network_idle(&tab, Duration::from_millis(self.config.network_idle_ms), timeout)?;

        // Resolve against where the page ended up after redirects.
        let landed = tab.get_url();
        let base_url = Url::parse(&landed)
            .or_else(|_| Url::parse(url))
            .map_err(|e| Error::LoadError(format!("Invalid page URL {}: {}", url, e)))?;

        Ok(CdpDocument {
            browser,
            tab,
            base_url,
        })
    }
}

/// A live Chrome tab holding one loaded reader page
pub struct CdpDocument {
    browser: Browser,
    tab: Arc<Tab>,
    base_url: Url,
}

impl CdpDocument {
    fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let eval = self.tab.evaluate(script, false)?;
        eval.value
            .ok_or_else(|| Error::RenderError("No value returned from evaluation".into()))
    }
}

impl Scrollable for CdpDocument {
    fn read_height(&mut self) -> Result<u64> {
        let value = self.eval(HEIGHT_SCRIPT)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h.max(0.0) as u64))
            .ok_or_else(|| Error::RenderError(format!("Unexpected document height: {}", value)))
    }

    fn scroll_to(&mut self, offset: u64) -> Result<()> {
        self.tab.evaluate(&format!("window.scrollTo(0, {})", offset), false)?;
        Ok(())
    }
}

impl RenderedDocument for CdpDocument {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn snapshot(&mut self, rule: &ScopeRule) -> Result<PageSnapshot> {
        let value = self.eval(&snapshot_script(rule))?;
        match value.as_str() {
            Some(json) => PageSnapshot::from_json(json, rule),
            None => Err(Error::RenderError(format!("Snapshot script returned {}", value))),
        }
    }

    fn close(self) -> Result<()> {
        if let Err(e) = self.tab.close(true) {
            warn!("Failed to close tab: {}", e);
        }
        // Dropping the browser terminates the child process.
        drop(self.tab);
        drop(self.browser);
        Ok(())
    }
}

/// Block until the document is complete and no new resources have been
/// requested for `idle`.
fn wait_for_network_idle(tab: &Tab, idle: Duration, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let mut last_state = String::new();
    let mut quiet_since = Instant::now();

    loop {
        let state = tab
            .evaluate(NETWORK_STATE_SCRIPT, false)
            .map_err(|e| Error::LoadError(format!("Failed to read load state: {}", e)))?
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        if state != last_state {
            debug!("network state: {}", state);
            last_state = state;
            quiet_since = Instant::now();
        } else if last_state.starts_with("complete:") && quiet_since.elapsed() >= idle {
            return Ok(());
        }

        if started.elapsed() >= timeout {
            return Err(Error::Timeout(timeout.as_millis() as u64));
        }
        std::thread::sleep(NETWORK_POLL);
    }
}
