use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tokio_retry::{strategy::FixedInterval, Retry};

use crate::{
    aggregate::{aggregate_stats, overall_score},
    analyzer::PageAnalyzer,
    frontier::Frontier,
    persistence::StateStore,
    types::{Audit, CrawlPhase, CrawlStatus, PageAnalysis, PageRecord, Progress},
};

/// Bounds and pacing for one crawl.
#[derive(Debug, Clone)]
pub struct CrawlLimits {
    pub max_pages: usize,
    pub max_depth: u32,
    /// Minimum interval between the starts of two consecutive page analyses.
    pub page_interval: Duration,
    /// Hard timeout for a single analyzer call.
    pub analyze_timeout: Duration,
    /// Retries after a timed-out or failed analyzer call.
    pub max_retries: u32,
    /// Poll period while suspended on the pause flag.
    pub pause_poll: Duration,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        CrawlLimits {
            max_pages: 50,
            max_depth: 3,
            page_interval: Duration::from_millis(800),
            analyze_timeout: Duration::from_secs(10),
            max_retries: 2,
            pause_poll: Duration::from_millis(500),
        }
    }
}

/// The single checkpointed unit of crawl progress. Serialized to the state
/// store after every processed page so a process restart resumes from the
/// last completed page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlState {
    pub status: CrawlPhase,
    pub start_url: String,
    pub started_at: DateTime<Utc>,
    pub frontier: Frontier,
    pub results: Vec<PageRecord>,
    pub progress: Progress,
}

impl CrawlState {
    pub fn new(start_url: &str) -> Self {
        CrawlState {
            status: CrawlPhase::Running,
            start_url: start_url.into(),
            started_at: Utc::now(),
            frontier: Frontier::seeded(start_url),
            results: Vec::new(),
            progress: Progress {
                completed: 0,
                remaining: 1,
                message: "Starting crawl...".into(),
            },
        }
    }
}

#[derive(Default)]
struct SignalFlags {
    paused: AtomicBool,
    cancelled: AtomicBool,
    running: AtomicBool,
    loop_active: AtomicBool,
}

/// Cross-task control flags for the crawl loop. Pause, resume and cancel are
/// independently settable booleans; the loop observes them at its suspension
/// points without taking any lock.
#[derive(Clone, Default)]
pub struct CrawlSignals {
    flags: Arc<SignalFlags>,
}

impl CrawlSignals {
    /// Reset the flags for a fresh crawl and mark it running.
    pub fn arm(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
        self.flags.cancelled.store(false, Ordering::SeqCst);
        self.flags.running.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    /// Cooperative: the loop finishes any in-flight analysis before exiting,
    /// but the crawl reports as not running right away.
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
        self.flags.running.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    pub fn loop_active(&self) -> bool {
        self.flags.loop_active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_loop_active(&self, active: bool) {
        self.flags.loop_active.store(active, Ordering::SeqCst);
    }

    fn set_running(&self, running: bool) {
        self.flags.running.store(running, Ordering::SeqCst);
    }
}

/// Enforces the minimum interval between the starts of consecutive page
/// analyses. The first call never waits.
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        RateLimiter {
            interval,
            last: None,
        }
    }

    pub async fn pace(&mut self) {
        if let Some(last) = self.last {
            let next = last + self.interval;
            if Instant::now() < next {
                tokio::time::sleep_until(next).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// The crawl state machine: owns the state for one traversal and drives the
/// main loop. One instance per crawl; the loop is the only writer of the
/// state, outside control happens through `CrawlSignals`.
pub struct Crawler {
    analyzer: Arc<dyn PageAnalyzer>,
    limits: CrawlLimits,
    signals: CrawlSignals,
    status: Arc<Mutex<CrawlStatus>>,
    store: StateStore,
    state: CrawlState,
    rate: RateLimiter,
}

impl Crawler {
    pub fn new(
        analyzer: Arc<dyn PageAnalyzer>,
        limits: CrawlLimits,
        signals: CrawlSignals,
        status: Arc<Mutex<CrawlStatus>>,
        store: StateStore,
        state: CrawlState,
    ) -> Self {
        let rate = RateLimiter::new(limits.page_interval);
        Crawler {
            analyzer,
            limits,
            signals,
            status,
            store,
            state,
            rate,
        }
    }

    /// Drive the crawl to a terminal phase. One iteration processes one page:
    /// pop, pause/cancel checks, rate-limit wait, analyze with bounded retry,
    /// enqueue discoveries, checkpoint.
    pub async fn run(mut self) -> CrawlPhase {
        info!(
            "starting crawl of {} (max {} pages, depth {})",
            self.state.start_url, self.limits.max_pages, self.limits.max_depth
        );

        self.publish_status();
        self.checkpoint().await;

        loop {
            if self.state.frontier.is_empty()
                || self.state.frontier.visited_count() >= self.limits.max_pages
                || self.signals.is_cancelled()
            {
                break;
            }

            // Pause suspends here, between pages, never mid-analysis. The
            // phase change is checkpointed so a process killed while paused
            // restarts paused instead of running.
            while self.signals.is_paused() && !self.signals.is_cancelled() {
                if self.state.status != CrawlPhase::Paused {
                    debug!("crawl paused");
                    self.state.status = CrawlPhase::Paused;
                    self.publish_status();
                    self.checkpoint().await;
                }
                sleep(self.limits.pause_poll).await;
            }
            if self.signals.is_cancelled() {
                break;
            }
            if self.state.status == CrawlPhase::Paused {
                debug!("crawl resumed");
                self.state.status = CrawlPhase::Running;
                self.checkpoint().await;
            }

            let entry = match self.state.frontier.pop() {
                Some(e) => e,
                None => break,
            };
            // Duplicates and too-deep entries are discarded without counting
            // as processed pages.
            if self.state.frontier.is_visited(&entry.url) || entry.depth > self.limits.max_depth {
                continue;
            }
            self.state.frontier.claim(&entry.url);

            self.rate.pace().await;

            // Links found at the maximum depth would never be traversed.
            let extract_links = entry.depth < self.limits.max_depth;
            debug!("analyzing {} at depth {}", entry.url, entry.depth);

            match self.fetch_analyze(&entry.url, extract_links).await {
                Ok(analysis) => self.record_page(&entry.url, entry.depth, analysis),
                Err(err) => {
                    warn!("skipping failed page {}: {}", entry.url, err);
                    self.state.progress = Progress {
                        completed: self.state.frontier.visited_count(),
                        remaining: self.state.frontier.remaining(),
                        message: format!(
                            "Skipped failed page, {} successful",
                            self.state.results.len()
                        ),
                    };
                }
            }

            self.publish_status();
            self.checkpoint().await;
        }

        self.finish().await
    }

    fn record_page(&mut self, url: &str, depth: u32, analysis: PageAnalysis) {
        let PageAnalysis {
            metrics,
            discovered_links,
        } = analysis;

        let found = discovered_links.len();
        for link in discovered_links {
            if !self.state.frontier.is_visited(&link) {
                self.state.frontier.enqueue(&link, depth + 1);
            }
        }

        self.state.results.push(PageRecord {
            url: url.into(),
            depth,
            metrics,
        });

        let completed = self.state.frontier.visited_count();
        let message = if found > 0 {
            format!("Analyzed {} pages, found {} links", completed, found)
        } else {
            format!("Analyzed {} pages", completed)
        };
        self.state.progress = Progress {
            completed,
            remaining: self.state.frontier.remaining(),
            message,
        };
    }

    /// One analyzer call under the hard timeout, retried a bounded number of
    /// times. A timeout and a collaborator error are treated identically.
    async fn fetch_analyze(&self, url: &str, extract_links: bool) -> Result<PageAnalysis, String> {
        let retries = self.limits.max_retries;
        let mut last_error = String::from("Timeout");
        for attempt in 0..=retries {
            let call = self
                .analyzer
                .analyze(url, extract_links, &self.state.start_url);
            match timeout(self.limits.analyze_timeout, call).await {
                Ok(Ok(analysis)) => return Ok(analysis),
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    if attempt < retries {
                        warn!(
                            "retrying {} after error (attempt {}/{}): {}",
                            url,
                            attempt + 1,
                            retries,
                            last_error
                        );
                    }
                }
                Err(_) => {
                    last_error = String::from("Timeout");
                    if attempt < retries {
                        warn!("retrying {} after timeout (attempt {}/{})", url, attempt + 1, retries);
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn finish(mut self) -> CrawlPhase {
        if self.signals.is_cancelled() {
            info!("crawl of {} cancelled, discarding results", self.state.start_url);
            self.state.status = CrawlPhase::Cancelled;
            self.state.progress.message = "Crawl cancelled".into();
        } else {
            info!(
                "crawl of {} complete, {} pages analyzed",
                self.state.start_url,
                self.state.results.len()
            );
            self.state.status = CrawlPhase::Completed;
            self.state.progress.message = "Crawl complete!".into();

            let audit = Audit {
                id: Utc::now().timestamp_millis(),
                start_url: self.state.start_url.clone(),
                overall_score: overall_score(&self.state.results),
                page_count: self.state.results.len(),
                started_at: self.state.started_at,
                finished_at: Utc::now(),
                pages: self.state.results.clone(),
                aggregate: aggregate_stats(&self.state.results),
                completed: true,
            };
            if let Err(e) = self.store.push_audit(&audit) {
                error!("could not save audit for {}: {}", self.state.start_url, e);
            }
        }

        // The live checkpoint is deleted on both terminal paths; only a
        // completed audit is durable.
        if let Err(e) = self.store.clear_checkpoint() {
            error!("could not clear crawl checkpoint: {}", e);
        }

        self.signals.set_running(false);
        self.signals.clear_pause();
        self.publish_status();
        self.signals.set_loop_active(false);
        self.state.status
    }

    fn publish_status(&self) {
        let snapshot = CrawlStatus {
            running: self.signals.is_running(),
            paused: self.signals.is_paused(),
            progress: self.state.progress.clone(),
            page_results: self.state.results.clone(),
        };
        let mut guard = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot;
    }

    /// Persist the state after each iteration. A failed write is retried
    /// once, then reported as a non-durable checkpoint; the crawl continues.
    async fn checkpoint(&self) {
        let strategy = FixedInterval::from_millis(100).take(1);
        let result = Retry::spawn(strategy, || async {
            self.store.save_checkpoint(&self.state)
        })
        .await;
        if let Err(e) = result {
            warn!("crawl checkpoint not durable: {}", e);
        }
    }
}
