use std::fmt::Write;

use crate::types::Audit;

/// Render a finished audit as a markdown report: overview tables, top
/// keyword/link frequency tables, and the per-page breakdown.
pub fn markdown_report(audit: &Audit) -> String {
    let mut md = String::new();
    let duration = (audit.finished_at - audit.started_at).num_seconds();

    let _ = writeln!(md, "# Website Audit Report\n");
    let _ = writeln!(md, "**URL:** {}", audit.start_url);
    let _ = writeln!(md, "**Date:** {}", audit.finished_at.format("%Y-%m-%d"));
    let _ = writeln!(md, "**Overall Score:** {}/100", audit.overall_score);
    let _ = writeln!(md, "**Pages Analyzed:** {}", audit.page_count);
    let _ = writeln!(md, "**Duration:** {}s\n", duration);
    md.push_str("---\n\n");

    if let Some(stats) = &audit.aggregate {
        md.push_str("## Site Overview\n\n");

        md.push_str("### Averages\n\n| Metric | Value |\n|---|---|\n");
        let _ = writeln!(md, "| Avg SEO Score | {} |", stats.averages.seo_score);
        let _ = writeln!(md, "| Avg Word Count | {} |", stats.averages.word_count);
        let _ = writeln!(md, "| Avg Readability | {} |", stats.averages.readability);
        let _ = writeln!(md, "| Median Readability | {} |\n", stats.median_readability);

        md.push_str("### Images\n\n| Metric | Value |\n|---|---|\n");
        let _ = writeln!(md, "| Total Images | {} |", stats.images.total);
        let _ = writeln!(
            md,
            "| With Alt Text | {} ({}%) |",
            stats.images.with_alt, stats.images.alt_percentage
        );
        let _ = writeln!(md, "| Without Alt Text | {} |\n", stats.images.without_alt);

        md.push_str("### Links\n\n| Metric | Value |\n|---|---|\n");
        let _ = writeln!(md, "| Internal Links | {} |", stats.links.total_internal);
        let _ = writeln!(md, "| External Links | {} |", stats.links.total_external);
        let _ = writeln!(md, "| Avg Internal/Page | {} |", stats.links.avg_internal_per_page);
        let _ = writeln!(md, "| Avg External/Page | {} |\n", stats.links.avg_external_per_page);

        if !stats.schema_types.is_empty() {
            md.push_str("### Schema Types\n\n");
            for (schema_type, count) in &stats.schema_types {
                let plural = if *count > 1 { "s" } else { "" };
                let _ = writeln!(md, "- **{}:** {} page{}", schema_type, count, plural);
            }
            md.push('\n');
        }

        if !stats.top_keywords.is_empty() {
            md.push_str("### Top Keywords Across Site\n\n| Keyword | Frequency |\n|---|---|\n");
            for (keyword, count) in &stats.top_keywords {
                let _ = writeln!(md, "| {} | {} |", keyword, count);
            }
            md.push('\n');
        }

        if !stats.top_outbound_links.is_empty() {
            md.push_str("### Most Common External Links\n\n| URL | Pages |\n|---|---|\n");
            for (url, count) in &stats.top_outbound_links {
                let _ = writeln!(md, "| {} | {} |", url, count);
            }
            md.push('\n');
        }
    }

    md.push_str("---\n\n## Pages Analyzed\n\n| URL | Score | Depth | Words |\n|---|---|---|---|\n");
    for page in &audit.pages {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} |",
            page.url, page.metrics.seo_score, page.depth, page.metrics.word_count
        );
    }
    md.push('\n');

    md
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::aggregate::{aggregate_stats, overall_score};
    use crate::types::{PageMetrics, PageRecord};
    use chrono::Utc;

    fn sample_audit() -> Audit {
        let pages = vec![
            PageRecord {
                url: "https://example.com".into(),
                depth: 0,
                metrics: PageMetrics {
                    seo_score: 90,
                    word_count: 500,
                    readability_score: 60.0,
                    keywords: vec![("coffee".into(), 4)],
                    outbound_links: vec!["https://x.io".into()],
                    ..Default::default()
                },
            },
            PageRecord {
                url: "https://example.com/a".into(),
                depth: 1,
                metrics: PageMetrics {
                    seo_score: 70,
                    word_count: 300,
                    readability_score: 50.0,
                    schema_types: vec!["Article".into()],
                    ..Default::default()
                },
            },
        ];
        Audit {
            id: 1,
            start_url: "https://example.com".into(),
            overall_score: overall_score(&pages),
            page_count: pages.len(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            aggregate: aggregate_stats(&pages),
            pages,
            completed: true,
        }
    }

    #[test]
    fn report_contains_all_sections() {
        let md = markdown_report(&sample_audit());
        assert!(md.contains("# Website Audit Report"));
        assert!(md.contains("**Overall Score:** 80/100"));
        assert!(md.contains("### Averages"));
        assert!(md.contains("### Images"));
        assert!(md.contains("### Links"));
        assert!(md.contains("- **Article:** 1 page"));
        assert!(md.contains("| coffee | 4 |"));
        assert!(md.contains("| https://x.io | 1 |"));
        assert!(md.contains("| https://example.com/a | 70 | 1 | 300 |"));
    }

    #[test]
    fn report_without_stats_skips_the_overview() {
        let mut audit = sample_audit();
        audit.aggregate = None;
        audit.pages.clear();
        let md = markdown_report(&audit);
        assert!(!md.contains("## Site Overview"));
        assert!(md.contains("## Pages Analyzed"));
    }
}
