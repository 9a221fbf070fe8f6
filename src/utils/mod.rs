//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Extract the host from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

/// Short human label for a site: host without `www.`, first label,
/// first letter upper-cased. Falls back to the input when it has no host.
pub fn site_label(url_str: &str) -> String {
    let host = get_domain(url_str).unwrap_or_else(|| url_str.to_string());
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let first = host.split('.').next().unwrap_or(host);
    capitalize(first)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
