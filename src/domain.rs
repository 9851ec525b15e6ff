//! Utility functions for handling domain names and URLs.

use crate::error::{AppError, Result};
use url::{Host, Url};

/// Second-level labels that act as public suffixes under a country TLD
/// (e.g. "co.uk"), so the registrable domain keeps one more label.
const TWO_LEVEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "ltd.uk", "plc.uk", "me.uk", "com.au", "net.au",
    "org.au", "edu.au", "gov.au", "co.nz", "org.nz", "net.nz", "co.jp", "or.jp", "ne.jp",
    "ac.jp", "co.kr", "or.kr", "com.br", "net.br", "org.br", "com.mx", "com.ar", "com.tr",
    "com.cn", "net.cn", "org.cn", "com.hk", "com.tw", "com.sg", "com.my", "co.in", "net.in",
    "org.in", "co.za", "co.il", "com.eg", "com.sa", "com.pk", "com.ng", "co.id", "co.th",
    "com.vn", "com.ph", "com.co", "com.pe", "com.ua", "com.pl",
];

/// Parses the input website string into a valid Url object, adding a scheme if necessary.
pub(crate) fn normalize_url(website_url_str: &str) -> Result<Url> {
    let trimmed = website_url_str.trim();
    if trimmed.is_empty() {
        return Err(AppError::DomainExtraction(
            "Website URL is empty".to_string(),
        ));
    }
    let url_str_with_scheme = if !trimmed.starts_with("http://") && !trimmed.starts_with("https://")
    {
        format!("https://{}", trimmed)
    } else {
        trimmed.to_string()
    };
    Url::parse(&url_str_with_scheme).map_err(AppError::UrlParse)
}

/// True when `url` is an absolute http(s) URL with a non-empty host.
pub(crate) fn is_well_formed_url(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|h| !h.is_empty())
        }
        Err(_) => false,
    }
}

/// Extracts the lowercase host without a leading "www." from a URL string.
/// Handles missing schemes and ports.
pub(crate) fn get_host_from_url(website_url_str: &str) -> Result<String> {
    let url = normalize_url(website_url_str)?;

    let host = url.host_str().ok_or_else(|| {
        tracing::warn!("Could not extract host from parsed URL: {}", url);
        AppError::DomainExtraction(format!("Could not extract host from parsed URL: {}", url))
    })?;

    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return Err(AppError::DomainExtraction(format!(
            "Empty host in URL: {}",
            website_url_str
        )));
    }
    Ok(host)
}

/// Reduces a host to its registrable domain: "shop.example.co.uk" -> "example.co.uk".
/// IP addresses and single-label hosts are returned unchanged.
pub(crate) fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();
    if matches!(Host::parse(&host), Ok(Host::Ipv4(_)) | Ok(Host::Ipv6(_))) {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if TWO_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    labels[labels.len() - keep..].join(".")
}

/// Extracts the registrable domain used as a record's identity.
///
/// # Arguments
/// * `website_url_str` - A URL, with or without a scheme.
///
/// # Returns
/// * `Ok(String)` with the lowercase registrable domain, `www.` and other subdomains removed.
/// * `Err(AppError::DomainExtraction)` if the URL is empty or has no host.
pub(crate) fn get_domain_from_url(website_url_str: &str) -> Result<String> {
    tracing::debug!("Attempting to extract domain from URL: {}", website_url_str);
    let host = get_host_from_url(website_url_str)?;
    let domain = registrable_domain(&host);
    tracing::debug!("Extracted domain '{}' from '{}'", domain, website_url_str);
    Ok(domain)
}
