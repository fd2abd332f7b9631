use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;

use crate::types::{AggregateStats, Averages, ImageStats, LinkStats, PageRecord};

const TOP_KEYWORDS: usize = 20;
const TOP_OUTBOUND_LINKS: usize = 15;

/// Arithmetic mean of the per-page SEO scores, rounded to the nearest
/// integer. 0 when no pages were analyzed.
pub fn overall_score(pages: &[PageRecord]) -> u32 {
    if pages.is_empty() {
        return 0;
    }
    let total: u64 = pages.iter().map(|p| p.metrics.seo_score as u64).sum();
    (total as f64 / pages.len() as f64).round() as u32
}

/// Fold all page records into one cross-page summary. Runs exactly once at
/// crawl completion and never mutates its input. Returns None for an empty
/// crawl; callers must not assume a summary exists.
pub fn aggregate_stats(pages: &[PageRecord]) -> Option<AggregateStats> {
    if pages.is_empty() {
        return None;
    }
    let page_count = pages.len() as u64;

    // Keyword totals keep first-encounter order so that ties sort stably.
    let mut keyword_order: Vec<String> = Vec::new();
    let mut keyword_totals: HashMap<String, u64> = HashMap::new();
    for page in pages {
        for (keyword, count) in &page.metrics.keywords {
            if !keyword_totals.contains_key(keyword) {
                keyword_order.push(keyword.clone());
            }
            *keyword_totals.entry(keyword.clone()).or_insert(0) += count;
        }
    }
    let mut top_keywords: Vec<(String, u64)> = keyword_order
        .into_iter()
        .map(|k| {
            let n = keyword_totals[&k];
            (k, n)
        })
        .collect();
    top_keywords.sort_by(|a, b| b.1.cmp(&a.1));
    top_keywords.truncate(TOP_KEYWORDS);

    // For each external URL, count how many distinct pages link to it.
    let mut link_order: Vec<String> = Vec::new();
    let mut link_pages: HashMap<String, u64> = HashMap::new();
    for page in pages {
        for url in page.metrics.outbound_links.iter().unique() {
            if !link_pages.contains_key(url) {
                link_order.push(url.clone());
            }
            *link_pages.entry(url.clone()).or_insert(0) += 1;
        }
    }
    let mut top_outbound_links: Vec<(String, u64)> = link_order
        .into_iter()
        .map(|u| {
            let n = link_pages[&u];
            (u, n)
        })
        .collect();
    top_outbound_links.sort_by(|a, b| b.1.cmp(&a.1));
    top_outbound_links.truncate(TOP_OUTBOUND_LINKS);

    let mut schema_types: BTreeMap<String, u64> = BTreeMap::new();
    for page in pages {
        for t in &page.metrics.schema_types {
            *schema_types.entry(t.clone()).or_insert(0) += 1;
        }
    }

    // Zero and missing values count toward every average.
    let total_words: u64 = pages.iter().map(|p| p.metrics.word_count).sum();
    let total_readability: f64 = pages.iter().map(|p| p.metrics.readability_score).sum();
    let total_seo: u64 = pages.iter().map(|p| p.metrics.seo_score as u64).sum();
    let averages = Averages {
        word_count: (total_words as f64 / page_count as f64).round() as u64,
        readability: round2(total_readability / page_count as f64),
        seo_score: round2(total_seo as f64 / page_count as f64),
    };

    let median_readability = median_readability(pages);

    let total_images: u64 = pages.iter().map(|p| p.metrics.images.len() as u64).sum();
    let with_alt: u64 = pages
        .iter()
        .flat_map(|p| &p.metrics.images)
        .filter(|img| img.has_alt())
        .count() as u64;
    let images = ImageStats {
        total: total_images,
        with_alt,
        without_alt: total_images - with_alt,
        alt_percentage: if total_images > 0 {
            ((with_alt as f64 / total_images as f64) * 100.0).round() as u32
        } else {
            0
        },
    };

    let total_internal: u64 = pages
        .iter()
        .map(|p| p.metrics.internal_links.len() as u64)
        .sum();
    let total_external: u64 = pages
        .iter()
        .map(|p| p.metrics.outbound_links.len() as u64)
        .sum();
    let links = LinkStats {
        total_internal,
        total_external,
        avg_internal_per_page: (total_internal as f64 / page_count as f64).round() as u64,
        avg_external_per_page: (total_external as f64 / page_count as f64).round() as u64,
    };

    Some(AggregateStats {
        top_keywords,
        top_outbound_links,
        schema_types,
        averages,
        median_readability,
        images,
        links,
    })
}

/// Median over pages with a positive readability score only; 0 when no page
/// qualifies.
fn median_readability(pages: &[PageRecord]) -> f64 {
    let mut scores: Vec<f64> = pages
        .iter()
        .map(|p| p.metrics.readability_score)
        .filter(|s| *s > 0.0)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = scores.len() / 2;
    let median = if scores.len() % 2 == 0 {
        (scores[mid - 1] + scores[mid]) / 2.0
    } else {
        scores[mid]
    };
    round2(median)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{ImageInfo, PageMetrics};

    fn page(url: &str, metrics: PageMetrics) -> PageRecord {
        PageRecord {
            url: url.into(),
            depth: 0,
            metrics,
        }
    }

    fn scored(url: &str, seo_score: u32) -> PageRecord {
        page(
            url,
            PageMetrics {
                seo_score,
                ..Default::default()
            },
        )
    }

    #[test]
    fn overall_score_is_the_rounded_mean() {
        let pages = vec![scored("a", 80), scored("b", 60), scored("c", 100)];
        assert_eq!(overall_score(&pages), 80);
        assert_eq!(overall_score(&[]), 0);
    }

    #[test]
    fn empty_results_produce_no_stats() {
        assert!(aggregate_stats(&[]).is_none());
    }

    #[test]
    fn median_readability_over_positive_scores() {
        let mk = |r: f64| {
            page(
                "u",
                PageMetrics {
                    readability_score: r,
                    ..Default::default()
                },
            )
        };
        // even count: average of the two middle values
        let pages = vec![mk(50.0), mk(70.0), mk(90.0), mk(30.0)];
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(stats.median_readability, 60.0);

        // zero scores are excluded from the median but not the mean
        let pages = vec![mk(0.0), mk(40.0), mk(80.0), mk(60.0)];
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(stats.median_readability, 60.0);
        assert_eq!(stats.averages.readability, 45.0);

        let pages = vec![mk(0.0), mk(0.0)];
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(stats.median_readability, 0.0);
    }

    #[test]
    fn image_alt_percentage() {
        let img = |alt: Option<&str>| ImageInfo {
            src: "s".into(),
            alt: alt.map(Into::into),
        };
        let p1 = page(
            "a",
            PageMetrics {
                images: vec![
                    img(Some("x")),
                    img(Some("y")),
                    img(Some("z")),
                    img(None),
                ],
                ..Default::default()
            },
        );
        let p2 = page(
            "b",
            PageMetrics {
                images: vec![img(None), img(Some(""))],
                ..Default::default()
            },
        );
        let stats = aggregate_stats(&[p1, p2]).unwrap();
        assert_eq!(stats.images.total, 6);
        assert_eq!(stats.images.with_alt, 3);
        assert_eq!(stats.images.without_alt, 3);
        assert_eq!(stats.images.alt_percentage, 50);
    }

    #[test]
    fn keyword_aggregation_is_commutative_in_page_order() {
        let kp = |url: &str, kws: &[(&str, u64)]| {
            page(
                url,
                PageMetrics {
                    keywords: kws.iter().map(|(k, n)| (k.to_string(), *n)).collect(),
                    ..Default::default()
                },
            )
        };
        let a = kp("a", &[("rust", 5), ("crawl", 2)]);
        let b = kp("b", &[("crawl", 4), ("audit", 3)]);

        let ab = aggregate_stats(&[a.clone(), b.clone()]).unwrap();
        let ba = aggregate_stats(&[b, a]).unwrap();
        assert_eq!(ab.top_keywords, ba.top_keywords);
        assert_eq!(
            ab.top_keywords,
            vec![
                ("crawl".to_string(), 6),
                ("rust".to_string(), 5),
                ("audit".to_string(), 3)
            ]
        );
    }

    #[test]
    fn keyword_ties_keep_encounter_order() {
        let kp = |url: &str, kws: &[(&str, u64)]| {
            page(
                url,
                PageMetrics {
                    keywords: kws.iter().map(|(k, n)| (k.to_string(), *n)).collect(),
                    ..Default::default()
                },
            )
        };
        let pages = vec![kp("a", &[("alpha", 3), ("beta", 3)]), kp("b", &[("gamma", 3)])];
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(
            stats.top_keywords,
            vec![
                ("alpha".to_string(), 3),
                ("beta".to_string(), 3),
                ("gamma".to_string(), 3)
            ]
        );
    }

    #[test]
    fn outbound_links_count_distinct_pages() {
        let lp = |url: &str, links: &[&str]| {
            page(
                url,
                PageMetrics {
                    outbound_links: links.iter().map(|l| l.to_string()).collect(),
                    ..Default::default()
                },
            )
        };
        // page a links to the same target twice; still counts as one page
        let pages = vec![
            lp("a", &["https://x.io", "https://x.io", "https://y.io"]),
            lp("b", &["https://x.io"]),
        ];
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(
            stats.top_outbound_links,
            vec![("https://x.io".to_string(), 2), ("https://y.io".to_string(), 1)]
        );
        // raw totals still count every occurrence
        assert_eq!(stats.links.total_external, 4);
        assert_eq!(stats.links.avg_external_per_page, 2);
    }

    #[test]
    fn schema_types_are_counted_across_pages() {
        let sp = |url: &str, types: &[&str]| {
            page(
                url,
                PageMetrics {
                    schema_types: types.iter().map(|t| t.to_string()).collect(),
                    ..Default::default()
                },
            )
        };
        let pages = vec![
            sp("a", &["Article", "BreadcrumbList"]),
            sp("b", &["Article"]),
            sp("c", &["Unknown"]),
        ];
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(stats.schema_types["Article"], 2);
        assert_eq!(stats.schema_types["BreadcrumbList"], 1);
        assert_eq!(stats.schema_types["Unknown"], 1);
    }

    #[test]
    fn top_k_limits_apply() {
        let mut pages = Vec::new();
        for i in 0..30 {
            let kws: Vec<(String, u64)> = vec![(format!("kw{}", i), 30 - i as u64)];
            let links: Vec<String> = vec![format!("https://ext{}.io", i)];
            pages.push(page(
                &format!("p{}", i),
                PageMetrics {
                    keywords: kws,
                    outbound_links: links,
                    ..Default::default()
                },
            ));
        }
        let stats = aggregate_stats(&pages).unwrap();
        assert_eq!(stats.top_keywords.len(), 20);
        assert_eq!(stats.top_outbound_links.len(), 15);
        assert_eq!(stats.top_keywords[0], ("kw0".to_string(), 30));
    }
}
