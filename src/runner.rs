use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Url;
use tokio::task::JoinHandle;

use crate::{
    analyzer::PageAnalyzer,
    crawler::{CrawlLimits, CrawlSignals, CrawlState, Crawler},
    persistence::StateStore,
    types::{Audit, AuditError, CrawlPhase, CrawlStatus},
};

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct RunnerOptions {
    // directory holding the crawl checkpoint and audit history
    #[builder(default = "self.default_state_dir()")]
    state_dir: PathBuf,
    // page budget for one crawl
    #[builder(default = "50")]
    max_pages: usize,
    // link-following depth (0 = seed page only)
    #[builder(default = "3")]
    max_depth: u32,
    // minimum interval between consecutive page analyses
    #[builder(default = "800")]
    page_interval_ms: u64,
    // hard timeout per analyzer call
    #[builder(default = "10_000")]
    analyze_timeout_ms: u64,
    // retries after a failed or timed-out analyzer call
    #[builder(default = "2")]
    max_retries: u32,
    // poll period while suspended on the pause flag
    #[builder(default = "500")]
    pause_poll_ms: u64,
}

impl RunnerOptions {
    pub fn default_builder() -> RunnerOptionsBuilder {
        RunnerOptionsBuilder::default()
    }

    fn limits(&self) -> CrawlLimits {
        CrawlLimits {
            max_pages: self.max_pages,
            max_depth: self.max_depth,
            page_interval: Duration::from_millis(self.page_interval_ms),
            analyze_timeout: Duration::from_millis(self.analyze_timeout_ms),
            max_retries: self.max_retries,
            pause_poll: Duration::from_millis(self.pause_poll_ms),
        }
    }
}

impl RunnerOptionsBuilder {
    fn default_state_dir(&self) -> PathBuf {
        PathBuf::from(".seo-audit")
    }
}

/// Owns the analyzer and the state store, spawns the crawl task, and exposes
/// the control surface: start, pause, resume, cancel, status, history. At
/// most one crawl loop is alive at a time.
pub struct Runner {
    analyzer: Arc<dyn PageAnalyzer>,
    store: StateStore,
    options: RunnerOptions,
    signals: CrawlSignals,
    status: Arc<Mutex<CrawlStatus>>,
    task: Mutex<Option<JoinHandle<CrawlPhase>>>,
}

impl Runner {
    pub fn new(options: RunnerOptions, analyzer: Arc<dyn PageAnalyzer>) -> Result<Self, AuditError> {
        let store = StateStore::open(&options.state_dir)?;
        Ok(Runner {
            analyzer,
            store,
            options,
            signals: CrawlSignals::default(),
            status: Arc::new(Mutex::new(CrawlStatus::default())),
            task: Mutex::new(None),
        })
    }

    /// Reset state and begin a fresh crawl from the seed. Fails when a crawl
    /// is already in flight.
    pub fn start_crawl(&self, seed_url: &str) -> Result<(), AuditError> {
        Url::parse(seed_url)
            .map_err(|e| AuditError::InvalidSeedUrl(seed_url.into(), e.to_string()))?;
        // the task lock makes the liveness check and the spawn one step, so
        // two racing callers cannot both start a loop
        let mut task = self.lock_task();
        if self.signals.loop_active() {
            return Err(AuditError::CrawlAlreadyRunning);
        }

        self.signals.arm();
        let state = CrawlState::new(seed_url);
        self.publish_initial(&state);
        *task = Some(self.spawn(state));
        Ok(())
    }

    /// Suspend the loop before the next page. The in-flight analysis, if
    /// any, still finishes.
    pub fn pause(&self) {
        debug!("pause requested");
        self.signals.pause();
    }

    /// Clear the pause flag. When no loop task is alive but a resumable
    /// checkpoint exists (e.g. the process restarted while paused), the loop
    /// is restarted from that checkpoint instead.
    pub fn resume(&self) -> Result<(), AuditError> {
        debug!("resume requested");
        self.signals.clear_pause();
        let mut task = self.lock_task();
        if self.signals.loop_active() {
            return Ok(());
        }
        match self.store.load_checkpoint()? {
            Some(state) if state.status.is_resumable() && !state.frontier.is_empty() => {
                info!("restarting stopped crawl of {}", state.start_url);
                self.signals.arm();
                self.publish_initial(&state);
                *task = Some(self.spawn(state));
            }
            _ => debug!("nothing to resume"),
        }
        Ok(())
    }

    /// Cooperative cancel: flags the loop, which exits at its next check
    /// without saving an audit.
    pub fn cancel(&self) {
        debug!("cancel requested");
        self.signals.cancel();
    }

    /// Read-only snapshot of the crawl. Never blocks the loop; safe to call
    /// at any time, including when idle.
    pub fn status(&self) -> CrawlStatus {
        let mut snapshot = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        snapshot.running = self.signals.is_running();
        snapshot.paused = self.signals.is_paused();
        snapshot
    }

    /// Startup hook: when the previous process died mid-crawl, pick the
    /// crawl back up from its checkpoint. Returns whether a crawl resumed.
    pub fn resume_from_checkpoint(&self) -> Result<bool, AuditError> {
        let mut task = self.lock_task();
        if self.signals.loop_active() {
            return Ok(false);
        }
        let state = match self.store.load_checkpoint()? {
            Some(s) if s.status.is_resumable() => s,
            _ => return Ok(false),
        };
        info!(
            "resuming crawl of {} from checkpoint ({} pages done, {} queued)",
            state.start_url,
            state.results.len(),
            state.frontier.remaining()
        );
        self.signals.arm();
        if state.status == CrawlPhase::Paused {
            self.signals.pause();
        }
        self.publish_initial(&state);
        *task = Some(self.spawn(state));
        Ok(true)
    }

    /// Wait for the in-flight crawl loop, if any, to reach a terminal phase.
    pub async fn wait(&self) -> Option<CrawlPhase> {
        let handle = self.lock_task().take();
        match handle {
            Some(h) => h.await.ok(),
            None => None,
        }
    }

    pub fn audits(&self) -> Result<Vec<Audit>, AuditError> {
        self.store.audits()
    }

    pub fn delete_audit(&self, id: i64) -> Result<(), AuditError> {
        self.store.delete_audit(id)
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<CrawlPhase>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // The flag is raised before the task is spawned so that a caller probing
    // right after start observes the crawl as in flight. Callers hold the
    // task lock across the liveness check and this call.
    fn spawn(&self, state: CrawlState) -> JoinHandle<CrawlPhase> {
        self.signals.set_loop_active(true);
        let crawler = Crawler::new(
            self.analyzer.clone(),
            self.options.limits(),
            self.signals.clone(),
            self.status.clone(),
            self.store.clone(),
            state,
        );
        tokio::spawn(crawler.run())
    }

    fn publish_initial(&self, state: &CrawlState) {
        let snapshot = CrawlStatus {
            running: true,
            paused: self.signals.is_paused(),
            progress: state.progress.clone(),
            page_results: state.results.clone(),
        };
        let mut guard = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot;
    }
}
