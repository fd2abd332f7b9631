use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("invalid seed url {0}: {1}")]
    InvalidSeedUrl(String, String),
    #[error("a crawl is already running")]
    CrawlAlreadyRunning,
    #[error("state_store: {0}")]
    StateStore(#[from] std::io::Error),
    #[error("state_store serialization: {0}")]
    StateSerialization(#[from] serde_json::Error),
}

/// Where the crawl currently is in its lifecycle. Persisted with the
/// checkpoint so a restart knows whether to pick the crawl back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlPhase {
    Idle,
    Running,
    Paused,
    Cancelled,
    Completed,
}

impl CrawlPhase {
    /// A checkpoint in one of these phases is picked back up on restart.
    pub fn is_resumable(&self) -> bool {
        matches!(self, CrawlPhase::Running | CrawlPhase::Paused)
    }
}

/// One not-yet-processed page in the breadth-first queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
}

/// Display-oriented view of crawl progress, recomputed after every page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub remaining: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    /// `None` when the image carries no alt attribute or an empty one.
    pub alt: Option<String>,
}

impl ImageInfo {
    pub fn has_alt(&self) -> bool {
        self.alt.as_deref().map(|a| !a.trim().is_empty()).unwrap_or(false)
    }
}

/// Per-page metrics produced by the page analyzer. Opaque to the crawl loop;
/// the aggregation engine reads every field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMetrics {
    pub seo_score: u32,
    pub word_count: u64,
    pub readability_score: f64,
    /// (keyword, occurrence count) pairs for this page.
    pub keywords: Vec<(String, u64)>,
    pub internal_links: Vec<String>,
    pub outbound_links: Vec<String>,
    pub images: Vec<ImageInfo>,
    pub schema_types: Vec<String>,
}

/// What the analyzer hands back for one page: the metrics plus, when asked
/// for, the same-site links discovered on it.
#[derive(Debug, Clone, Default)]
pub struct PageAnalysis {
    pub metrics: PageMetrics,
    pub discovered_links: Vec<String>,
}

/// The immutable outcome of analyzing one URL, appended to the crawl results
/// in completion order. Pages that failed all retries are never appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub depth: u32,
    pub metrics: PageMetrics,
}

/// Read-only snapshot handed out by `status()`. Always observes the most
/// recently checkpointed state, never blocks the crawl loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStatus {
    pub running: bool,
    pub paused: bool,
    pub progress: Progress,
    pub page_results: Vec<PageRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub word_count: u64,
    pub readability: f64,
    pub seo_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    pub total: u64,
    pub with_alt: u64,
    pub without_alt: u64,
    /// Rounded percentage, 0 when there are no images at all.
    pub alt_percentage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub total_internal: u64,
    pub total_external: u64,
    pub avg_internal_per_page: u64,
    pub avg_external_per_page: u64,
}

/// Cross-page statistical summary computed once over all page records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub top_keywords: Vec<(String, u64)>,
    pub top_outbound_links: Vec<(String, u64)>,
    pub schema_types: BTreeMap<String, u64>,
    pub averages: Averages,
    pub median_readability: f64,
    pub images: ImageStats,
    pub links: LinkStats,
}

/// A finalized crawl report. Created once at completion, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub id: i64,
    pub start_url: String,
    pub overall_score: u32,
    pub page_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages: Vec<PageRecord>,
    pub aggregate: Option<AggregateStats>,
    pub completed: bool,
}
