//! Async-friendly extraction backed by dedicated worker threads.
//!
//! Rendering backends are synchronous and their documents are not `Send`, so
//! each extraction runs start to finish on its own worker thread that owns
//! the engine and the document. The async side only waits for the reply.

use crate::cancel::{CancelOnDrop, CancelToken};
use crate::extract::{Extractor, Progress, ProgressHandler};
use crate::trigger::{Clock, SystemClock};
use crate::{Engine, EngineConfig, Error, Result};
use futures::stream::{self, StreamExt};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

/// Number of extractions [`AsyncExtractor::extract_many`] runs at once when
/// the caller passes `0`.
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, 4)
}

/// Runs extractions for engine `E` off the async executor.
///
/// Dropping the future returned by [`AsyncExtractor::extract`] cancels the
/// worker at its next checkpoint.
pub struct AsyncExtractor<E> {
    config: EngineConfig,
    clock: Arc<dyn Clock + Send + Sync>,
    on_progress: Option<ProgressHandler>,
    _engine: PhantomData<fn() -> E>,
}

impl<E> AsyncExtractor<E>
where
    E: Engine + 'static,
{
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            on_progress: None,
            _engine: PhantomData,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a callback invoked from worker threads for every progress event.
    pub fn on_progress<F>(&mut self, cb: F)
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(cb));
    }

    /// Extract the ordered page image URLs of `url` on a worker thread.
    pub async fn extract(&self, url: &str, cancel: &CancelToken) -> Result<Vec<String>> {
        let worker_cancel = cancel.child();
        let _guard = CancelOnDrop(worker_cancel.clone());

        let (tx, rx) = oneshot::channel::<Result<Vec<String>>>();
        let config = self.config.clone();
        let clock = self.clock.clone();
        let on_progress = self.on_progress.clone();
        let target = url.to_string();

        thread::Builder::new()
            .name("webcomic2pdf-extract".into())
            .spawn(move || {
                let res = Extractor::<E>::new(config)
                    .map_err(|e| e.for_page(&target))
                    .and_then(|extractor| {
                        let mut extractor = extractor.with_clock(clock);
                        extractor.set_progress_handler(on_progress);
                        extractor.extract_with_cancel(&target, &worker_cancel)
                    });
                // Receiver is gone when the caller dropped the future.
                let _ = tx.send(res);
            })
            .map_err(|e| Error::Other(format!("Failed to spawn extraction worker: {}", e)).for_page(url))?;

        rx.await
            .map_err(|e| Error::Other(format!("Extraction worker exited without replying: {}", e)).for_page(url))?
    }

    /// Extract several pages, at most `concurrency` at a time.
    ///
    /// Results come back in input order, one per URL; a failing page does not
    /// stop the others. `concurrency == 0` means [`default_concurrency`].
    pub async fn extract_many<I>(
        &self,
        urls: I,
        concurrency: usize,
        cancel: &CancelToken,
    ) -> Vec<(String, Result<Vec<String>>)>
    where
        I: IntoIterator<Item = String>,
    {
        let limit = if concurrency == 0 {
            default_concurrency()
        } else {
            concurrency
        };

        stream::iter(urls)
            .map(|url| async move {
                let res = self.extract(&url, cancel).await;
                (url, res)
            })
            .buffered(limit)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::SimpleEngine;
    use std::sync::Mutex;
    use std::time::Duration;

    struct InstantClock;
    impl Clock for InstantClock {
        fn pause(&self, _duration: Duration) {}
    }

    /// Serve the same single-image reader page for every request.
    fn serve_reader(requests: usize) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr();
        std::thread::spawn(move || {
            for _ in 0..requests {
                let Ok(request) = server.recv() else { return };
                let page = format!(
                    r#"<div class="reading-content"><div class="page-break"><img src="/img{}.png"></div></div>"#,
                    request.url().trim_end_matches('/')
                );
                let _ = request.respond(tiny_http::Response::from_string(page));
            }
        });
        format!("http://{}", addr)
    }

    fn extractor() -> AsyncExtractor<SimpleEngine> {
        AsyncExtractor::new(EngineConfig::default()).with_clock(Arc::new(InstantClock))
    }

    #[tokio::test]
    async fn test_extract_on_worker() {
        let base = serve_reader(1);
        let mut ex = extractor();
        let events = Arc::new(Mutex::new(0usize));
        let sink = events.clone();
        ex.on_progress(move |_| *sink.lock().unwrap() += 1);

        let urls = ex.extract(&format!("{}/ch1", base), &CancelToken::new()).await.unwrap();
        assert_eq!(urls, vec![format!("{}/img/ch1.png", base)]);
        assert_eq!(*events.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = extractor()
            .extract("http://127.0.0.1:9/never", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_extract_many_keeps_input_order() {
        let base = serve_reader(3);
        let urls: Vec<String> = (1..=3).map(|i| format!("{}/ch{}", base, i)).collect();
        let results = extractor().extract_many(urls.clone(), 2, &CancelToken::new()).await;

        assert_eq!(results.len(), 3);
        for ((url, res), expected) in results.into_iter().zip(urls) {
            assert_eq!(url, expected);
            let images = res.unwrap();
            assert_eq!(images.len(), 1);
            assert!(images[0].ends_with(&format!("{}.png", &url[base.len()..])));
        }
    }
}
