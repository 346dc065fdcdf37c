//! Lazy-load trigger.
//!
//! Reader pages often load images only once they scroll into view. The
//! trigger keeps scrolling to the bottom of the document and waits for its
//! height to stop growing, so every page image exists before collection.
//!
//! The loop is a small polling state machine: each poll scrolls, pauses for
//! the settle interval and re-reads the height. A strictly taller reading
//! resets the stability counter; anything else advances it. Polling ends once
//! the counter reaches the threshold, or when the optional poll cap runs out.

use crate::cancel::CancelToken;
use crate::{Result, Scrollable};
use log::{debug, warn};
use std::time::Duration;

/// Source of the settle pauses between polls.
pub trait Clock {
    fn pause(&self, duration: Duration);
}

/// Pauses by sleeping the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Tuning for the stabilization loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Pause after each forced scroll
    pub settle_interval: Duration,
    /// Consecutive polls without growth needed to stop
    pub threshold: u32,
    /// Upper bound on polls; `None` polls until the page settles
    pub max_polls: Option<u32>,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            settle_interval: Duration::from_millis(400),
            threshold: 8,
            max_polls: Some(750),
        }
    }
}

/// Outcome of a stabilization run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stabilization {
    /// Number of scroll/pause/read polls performed
    pub polls: u32,
    /// Height observed by the last reading
    pub final_height: u64,
    /// `false` when the poll cap stopped the loop before the page settled
    pub stabilized: bool,
}

/// Scroll `doc` until its height stops growing.
pub fn trigger_lazy_load<D, C>(
    doc: &mut D,
    policy: &StabilityPolicy,
    clock: &C,
    cancel: &CancelToken,
) -> Result<Stabilization>
where
    D: Scrollable + ?Sized,
    C: Clock + ?Sized,
{
    cancel.check()?;
    let mut previous = doc.read_height()?;
    let mut stable = 0u32;
    let mut polls = 0u32;

    while stable < policy.threshold {
        if let Some(max) = policy.max_polls {
            if polls >= max {
                warn!(
                    "Page still growing after {} polls (height {}); continuing with what has loaded",
                    polls, previous
                );
                return Ok(Stabilization {
                    polls,
                    final_height: previous,
                    stabilized: false,
                });
            }
        }

        cancel.check()?;
        doc.scroll_to(previous)?;
        clock.pause(policy.settle_interval);
        cancel.check()?;

        let height = doc.read_height()?;
        polls += 1;
        if height > previous {
            stable = 0;
        } else {
            stable += 1;
        }
        debug!("poll {}: height {} -> {} (stable {})", polls, previous, height, stable);
        previous = height;
    }

    Ok(Stabilization {
        polls,
        final_height: previous,
        stabilized: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Mutex;

    /// Height source that replays a script of readings, repeating the last.
    struct ScriptedPage {
        heights: Vec<u64>,
        reads: usize,
        scrolls: Vec<u64>,
    }

    impl ScriptedPage {
        fn new(heights: Vec<u64>) -> Self {
            Self {
                heights,
                reads: 0,
                scrolls: Vec::new(),
            }
        }
    }

    impl Scrollable for ScriptedPage {
        fn read_height(&mut self) -> Result<u64> {
            let idx = self.reads.min(self.heights.len() - 1);
            self.reads += 1;
            Ok(self.heights[idx])
        }

        fn scroll_to(&mut self, offset: u64) -> Result<()> {
            self.scrolls.push(offset);
            Ok(())
        }
    }

    /// Page that grows by a fixed step on every reading
    struct EndlessPage(u64);

    impl Scrollable for EndlessPage {
        fn read_height(&mut self) -> Result<u64> {
            self.0 += 100;
            Ok(self.0)
        }

        fn scroll_to(&mut self, _offset: u64) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeClock {
        pauses: Mutex<Vec<Duration>>,
    }

    impl Clock for FakeClock {
        fn pause(&self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
        }
    }

    fn policy(threshold: u32, max_polls: Option<u32>) -> StabilityPolicy {
        StabilityPolicy {
            settle_interval: Duration::from_millis(400),
            threshold,
            max_polls,
        }
    }

    #[test]
    fn test_constant_height_stops_after_threshold() {
        let mut page = ScriptedPage::new(vec![1200]);
        let clock = FakeClock::default();
        let res = trigger_lazy_load(&mut page, &policy(8, None), &clock, &CancelToken::new()).unwrap();
        assert_eq!(res.polls, 8);
        assert!(res.stabilized);
        assert_eq!(res.final_height, 1200);
        assert_eq!(clock.pauses.lock().unwrap().len(), 8);
        assert!(page.scrolls.iter().all(|&o| o == 1200));
    }

    #[test]
    fn test_growth_resets_counter() {
        // Twenty growth steps, then flat.
        let heights: Vec<u64> = (0..=20).map(|i| 1000 + i * 250).collect();
        let mut page = ScriptedPage::new(heights);
        let res =
            trigger_lazy_load(&mut page, &policy(8, None), &FakeClock::default(), &CancelToken::new()).unwrap();
        assert_eq!(res.polls, 28);
        assert_eq!(res.final_height, 6000);
        // Each scroll targets the latest known height.
        assert_eq!(page.scrolls[0], 1000);
        assert_eq!(page.scrolls[20], 6000);
    }

    #[test]
    fn test_shrinking_height_counts_as_stable() {
        let mut page = ScriptedPage::new(vec![900, 800, 700, 900]);
        let res =
            trigger_lazy_load(&mut page, &policy(3, None), &FakeClock::default(), &CancelToken::new()).unwrap();
        // 800 and 700 are stable readings; 900 grows again and resets.
        assert_eq!(res.polls, 6);
    }

    #[test]
    fn test_growing_page_never_settles_early() {
        let mut page = EndlessPage(0);
        let res =
            trigger_lazy_load(&mut page, &policy(8, Some(40)), &FakeClock::default(), &CancelToken::new()).unwrap();
        assert_eq!(res.polls, 40);
        assert!(!res.stabilized);
    }

    #[test]
    fn test_zero_threshold_does_not_poll() {
        let mut page = ScriptedPage::new(vec![10]);
        let res =
            trigger_lazy_load(&mut page, &policy(0, None), &FakeClock::default(), &CancelToken::new()).unwrap();
        assert_eq!(res.polls, 0);
        assert!(page.scrolls.is_empty());
    }

    #[test]
    fn test_cancel_during_pause_fails() {
        struct CancellingClock(CancelToken);
        impl Clock for CancellingClock {
            fn pause(&self, _duration: Duration) {
                self.0.cancel();
            }
        }

        let cancel = CancelToken::new();
        let mut page = ScriptedPage::new(vec![100]);
        let res = trigger_lazy_load(&mut page, &policy(8, None), &CancellingClock(cancel.clone()), &cancel);
        assert!(matches!(res, Err(Error::Cancelled)));
        assert_eq!(page.scrolls.len(), 1);
    }

    #[test]
    fn test_unreachable_document_propagates() {
        struct CrashedPage;
        impl Scrollable for CrashedPage {
            fn read_height(&mut self) -> Result<u64> {
                Err(Error::RenderError("target closed".into()))
            }
            fn scroll_to(&mut self, _offset: u64) -> Result<()> {
                Ok(())
            }
        }

        let res = trigger_lazy_load(
            &mut CrashedPage,
            &StabilityPolicy::default(),
            &FakeClock::default(),
            &CancelToken::new(),
        );
        assert!(matches!(res, Err(Error::RenderError(_))));
    }
}
