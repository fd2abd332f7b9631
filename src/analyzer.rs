use crate::types::PageAnalysis;

/// Contract for the page-analysis collaborator.
///
/// The crawl loop imposes its own timeout and bounded retry around every
/// call, so an implementation is free to fail or hang; it only has to release
/// whatever per-page resources it allocated on every exit path. When
/// `extract_links` is set the implementation additionally reports the
/// same-site links found on the page (relative to `base_url`); a failure of
/// that secondary step must degrade to an empty link list rather than fail
/// the page.
#[async_trait::async_trait]
pub trait PageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        url: &str,
        extract_links: bool,
        base_url: &str,
    ) -> anyhow::Result<PageAnalysis>;
}
