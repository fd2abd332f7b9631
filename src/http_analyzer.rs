use std::collections::HashMap;

use anyhow::Context;
use itertools::Itertools;
use reqwest::Url;
use scraper::{Html, Selector};
use tokio::task;

use crate::{
    analyzer::PageAnalyzer,
    types::{ImageInfo, PageAnalysis, PageMetrics},
    utils::{normalize_url, same_domain},
};

const KEYWORDS_PER_PAGE: usize = 10;
const MIN_KEYWORD_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "between", "both", "could", "does",
    "each", "from", "have", "having", "here", "https", "into", "just", "like", "made", "make",
    "more", "most", "much", "must", "only", "other", "over", "said", "same", "should", "some",
    "such", "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "under", "very", "were", "what", "when", "where", "which", "while", "will",
    "with", "would", "your",
];

/// Page analyzer backed by a plain HTTP fetch and static-HTML parsing. Stands
/// in for a rendering pipeline; good enough for server-rendered sites. The
/// response body and parsed DOM are dropped on every exit path, so no
/// per-page resource outlives the call.
pub struct HttpAnalyzer {
    client: reqwest::Client,
}

impl HttpAnalyzer {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("seo-audit/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("could not build http client")?;
        Ok(HttpAnalyzer { client })
    }
}

#[async_trait::async_trait]
impl PageAnalyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        url: &str,
        extract_links: bool,
        base_url: &str,
    ) -> anyhow::Result<PageAnalysis> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context(format!("could not fetch {}", url))?
            .error_for_status()
            .context(format!("error status for {}", url))?
            .text()
            .await
            .context(format!("could not read body of {}", url))?;

        // parsing is CPU-bound and Html is not Send
        let url = url.to_string();
        let base_url = base_url.to_string();
        task::spawn_blocking(move || analyze_document(&body, &url, &base_url, extract_links))
            .await
            .context("analyzer worker panicked")?
    }
}

fn analyze_document(
    body: &str,
    url: &str,
    base_url: &str,
    extract_links: bool,
) -> anyhow::Result<PageAnalysis> {
    let page_url = Url::parse(url).context(format!("invalid page url {}", url))?;
    let base = Url::parse(base_url).context(format!("invalid base url {}", base_url))?;
    let doc = Html::parse_document(body);

    let text = visible_text(&doc);
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len() as u64;

    let title = select_first_text(&doc, "title");
    let meta_description = doc
        .select(&sel("meta[name=\"description\"]"))
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);
    let h1_count = doc.select(&sel("h1")).count();

    let (internal_links, outbound_links) = partition_links(&doc, &page_url, &base);

    let images: Vec<ImageInfo> = doc
        .select(&sel("img"))
        .filter_map(|img| {
            let src = img.value().attr("src")?;
            Some(ImageInfo {
                src: normalize_url(&page_url, src).unwrap_or_else(|| src.to_string()),
                alt: img.value().attr("alt").map(String::from),
            })
        })
        .collect();

    let schema_types = schema_types(&doc);
    let keywords = top_keywords(&words);
    let readability_score = flesch_reading_ease(&text, words.len());
    let seo_score = seo_score(
        title.as_deref(),
        meta_description.as_deref(),
        h1_count,
        word_count,
        &images,
        &internal_links,
    );

    let discovered_links = if extract_links {
        internal_links.iter().unique().cloned().collect()
    } else {
        Vec::new()
    };

    Ok(PageAnalysis {
        metrics: PageMetrics {
            seo_score,
            word_count,
            readability_score,
            keywords,
            internal_links,
            outbound_links,
            images,
            schema_types,
        },
        discovered_links,
    })
}

fn sel(selector: &str) -> Selector {
    // all selectors in this module are static and known-valid
    Selector::parse(selector).unwrap()
}

fn select_first_text(doc: &Html, selector: &str) -> Option<String> {
    doc.select(&sel(selector))
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn visible_text(doc: &Html) -> String {
    let content = sel("p, h1, h2, h3, h4, h5, h6, li, td, th, blockquote, figcaption");
    let mut out = String::new();
    for el in doc.select(&content) {
        for chunk in el.text() {
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                out.push_str(chunk);
                out.push(' ');
            }
        }
    }
    out
}

fn partition_links(doc: &Html, page_url: &Url, base: &Url) -> (Vec<String>, Vec<String>) {
    let mut internal = Vec::new();
    let mut outbound = Vec::new();
    for anchor in doc.select(&sel("a[href]")) {
        let href = match anchor.value().attr("href") {
            Some(h) => h,
            None => continue,
        };
        let normalized = match normalize_url(page_url, href) {
            Some(n) => n,
            None => continue,
        };
        match Url::parse(&normalized) {
            Ok(u) if same_domain(&u, base) => internal.push(normalized),
            Ok(_) => outbound.push(normalized),
            Err(_) => {}
        }
    }
    (internal, outbound)
}

/// `@type` values from JSON-LD blocks. Malformed blocks are swallowed here;
/// an untyped object is reported under the "Unknown" label.
fn schema_types(doc: &Html) -> Vec<String> {
    let mut types = Vec::new();
    for script in doc.select(&sel("script[type=\"application/ld+json\"]")) {
        let raw = script.text().collect::<String>();
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                debug!("skipping malformed json-ld block: {}", e);
                continue;
            }
        };
        collect_schema_types(&value, &mut types);
    }
    types
}

fn collect_schema_types(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_schema_types(item, out);
            }
        }
        serde_json::Value::Object(obj) => match obj.get("@type") {
            Some(serde_json::Value::String(t)) => out.push(t.clone()),
            Some(serde_json::Value::Array(ts)) => {
                out.extend(ts.iter().filter_map(|t| t.as_str().map(String::from)))
            }
            _ => out.push("Unknown".into()),
        },
        _ => {}
    }
}

fn top_keywords(words: &[&str]) -> Vec<(String, u64)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u64> = HashMap::new();
    for word in words {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() < MIN_KEYWORD_LEN || STOPWORDS.contains(&cleaned.as_str()) {
            continue;
        }
        if !counts.contains_key(&cleaned) {
            order.push(cleaned.clone());
        }
        *counts.entry(cleaned).or_insert(0) += 1;
    }
    let mut keywords: Vec<(String, u64)> = order
        .into_iter()
        .map(|w| {
            let n = counts[&w];
            (w, n)
        })
        .collect();
    keywords.sort_by(|a, b| b.1.cmp(&a.1));
    keywords.truncate(KEYWORDS_PER_PAGE);
    keywords
}

/// Flesch reading ease, clamped to 0..=100. 0 when the page has no prose.
fn flesch_reading_ease(text: &str, word_count: usize) -> f64 {
    if word_count == 0 {
        return 0.0;
    }
    let sentences = text
        .split(|c| c == '.' || c == '!' || c == '?')
        .filter(|s| s.split_whitespace().count() > 1)
        .count()
        .max(1);
    let syllables: usize = text
        .split_whitespace()
        .map(estimate_syllables)
        .sum::<usize>()
        .max(1);

    let words = word_count as f64;
    let score = 206.835 - 1.015 * (words / sentences as f64) - 84.6 * (syllables as f64 / words);
    score.clamp(0.0, 100.0)
}

fn estimate_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut count = 0;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    // silent trailing e, except -ee and -le endings
    if lower.ends_with('e') && !lower.ends_with("ee") && !lower.ends_with("le") && count > 1 {
        count -= 1;
    }
    count.max(1)
}

fn seo_score(
    title: Option<&str>,
    meta_description: Option<&str>,
    h1_count: usize,
    word_count: u64,
    images: &[ImageInfo],
    internal_links: &[String],
) -> u32 {
    let mut score: i32 = 100;

    match title {
        None => score -= 15,
        Some(t) if t.len() < 10 || t.len() > 70 => score -= 5,
        Some(_) => {}
    }
    if meta_description.is_none() {
        score -= 10;
    }
    if h1_count != 1 {
        score -= 10;
    }
    if word_count < 300 {
        score -= 10;
    }
    if !images.is_empty() && images.iter().any(|img| !img.has_alt()) {
        score -= 10;
    }
    if internal_links.is_empty() {
        score -= 5;
    }

    score.max(0) as u32
}

#[cfg(test)]
mod test {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <title>Coffee Brewing Guide for Beginners</title>
  <meta name="description" content="Everything you need to brew great coffee at home.">
  <script type="application/ld+json">{"@type": "Article", "headline": "Coffee"}</script>
  <script type="application/ld+json">{"name": "untyped"}</script>
</head>
<body>
  <h1>Coffee Brewing Guide</h1>
  <p>Brewing coffee well takes practice. Grind fresh coffee beans every morning.
     Water temperature matters for coffee extraction. Brewing ratios control strength.</p>
  <img src="/grinder.png" alt="A burr grinder">
  <img src="/kettle.png" alt="">
  <a href="/methods">Brewing methods</a>
  <a href="/methods#pour-over">Pour over</a>
  <a href="https://example.org/roasters">Roasters</a>
  <a href="mailto:hi@coffee.test">Contact</a>
</body>
</html>"#;

    fn analyzed(extract_links: bool) -> PageAnalysis {
        analyze_document(
            PAGE,
            "https://coffee.test/guide",
            "https://coffee.test/",
            extract_links,
        )
        .unwrap()
    }

    #[test]
    fn partitions_internal_and_external_links() {
        let analysis = analyzed(false);
        assert_eq!(
            analysis.metrics.internal_links,
            vec![
                "https://coffee.test/methods".to_string(),
                "https://coffee.test/methods".to_string(),
            ]
        );
        assert_eq!(
            analysis.metrics.outbound_links,
            vec!["https://example.org/roasters".to_string()]
        );
    }

    #[test]
    fn discovered_links_only_when_requested_and_deduped() {
        assert!(analyzed(false).discovered_links.is_empty());
        assert_eq!(
            analyzed(true).discovered_links,
            vec!["https://coffee.test/methods".to_string()]
        );
    }

    #[test]
    fn collects_images_with_alt_state() {
        let images = analyzed(false).metrics.images;
        assert_eq!(images.len(), 2);
        assert!(images[0].has_alt());
        assert!(!images[1].has_alt());
        assert_eq!(images[0].src, "https://coffee.test/grinder.png");
    }

    #[test]
    fn collects_schema_types_with_unknown_fallback() {
        let types = analyzed(false).metrics.schema_types;
        assert_eq!(types, vec!["Article".to_string(), "Unknown".to_string()]);
    }

    #[test]
    fn keywords_skip_stopwords_and_short_words() {
        let metrics = analyzed(false).metrics;
        assert_eq!(metrics.keywords[0].0, "coffee");
        assert!(metrics.keywords[0].1 >= 4);
        assert!(metrics.keywords.iter().all(|(k, _)| k.len() >= MIN_KEYWORD_LEN));
        assert!(metrics.keywords.iter().all(|(k, _)| k != "with"));
    }

    #[test]
    fn counts_words_and_scores_readability() {
        let metrics = analyzed(false).metrics;
        assert!(metrics.word_count > 20);
        assert!(metrics.readability_score > 0.0);
        assert!(metrics.readability_score <= 100.0);
    }

    #[test]
    fn seo_score_penalizes_missing_signals() {
        let full = analyzed(false).metrics.seo_score;
        let bare = analyze_document(
            "<html><head></head><body><p>tiny</p></body></html>",
            "https://coffee.test/x",
            "https://coffee.test/",
            false,
        )
        .unwrap()
        .metrics
        .seo_score;
        assert!(full > bare);
        // thin page with no title/meta/h1/links: 100 - 15 - 10 - 10 - 10 - 5
        assert_eq!(bare, 50);
    }

    #[test]
    fn syllable_estimates() {
        assert_eq!(estimate_syllables("coffee"), 2);
        assert_eq!(estimate_syllables("a"), 1);
        assert_eq!(estimate_syllables("table"), 2);
        assert_eq!(estimate_syllables("practice"), 2);
    }
}
