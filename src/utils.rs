use reqwest::Url;

/// Resolve a raw href against the page it was found on, dropping fragments
/// and anything that is not http(s). Returns None for hrefs we never want to
/// queue (mailto:, javascript:, unparsable garbage).
pub fn normalize_url(page_url: &Url, href: &str) -> Option<String> {
    let mut url = match Url::parse(href) {
        Ok(u) => u,
        Err(_) => page_url.join(href).ok()?,
    };
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url.to_string())
}

pub fn same_domain(a: &Url, b: &Url) -> bool {
    a.host_str().is_some() && a.host_str() == b.host_str()
}

/// Shorten a URL for terminal display, keeping the host intact.
pub fn truncate_url(url: &str, max_len: usize) -> String {
    if url.len() <= max_len {
        return url.to_string();
    }
    match Url::parse(url) {
        Ok(u) => {
            let host = u.host_str().unwrap_or_default();
            let path = u.path();
            if host.len() + path.len() <= max_len {
                format!("{}{}", host, path)
            } else {
                let keep = max_len.saturating_sub(host.len() + 3).min(path.len());
                format!("{}{}...", host, &path[..keep])
            }
        }
        // cut on a char boundary, max_len is a byte length
        Err(_) => format!("{}...", url.chars().take(max_len).collect::<String>()),
    }
}
