//! Defines the core data structures used in the site-sleuth application.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use url::Url;

/// One entry of a search result page, in API relevance order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchCandidate {
    /// The result link.
    pub url: String,
    /// The result title as shown by the search engine.
    #[serde(default)]
    pub title: String,
    /// The result snippet as shown by the search engine.
    #[serde(default)]
    pub snippet: String,
}

impl SearchCandidate {
    #[cfg(test)]
    pub(crate) fn new(url: &str, title: &str, snippet: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
        }
    }
}

/// A fetched document. Lives only for the duration of one candidate's processing.
#[derive(Debug, Clone)]
pub(crate) struct RawPage {
    /// The final URL after redirects.
    pub url: Url,
    /// The response body as received (possibly truncated at the configured cap).
    pub bytes: Vec<u8>,
    /// The charset parameter of the `Content-Type` header, if any.
    pub declared_charset: Option<String>,
    /// The name of the encoding actually used for `decoded_text`.
    pub encoding: &'static str,
    /// The body decoded to UTF-8.
    pub decoded_text: String,
}

/// Contact information extracted for one candidate site.
///
/// Every contact field is optional; absence is a valid state. The `domain`
/// is the registrable domain of `source_url` and is the identity used for
/// deduplication.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContactRecord {
    pub source_url: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub name_translated: bool,
    #[serde(default)]
    pub address_translated: bool,
}

impl ContactRecord {
    /// Creates a record with all contact fields empty.
    pub(crate) fn new(source_url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// True when name, email, phone and address are all absent.
    pub(crate) fn has_no_contact_fields(&self) -> bool {
        self.company_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }
}

/// Ordered records, at most one per domain, in first-accepted order.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReportSet {
    records: Vec<ContactRecord>,
    seen_domains: HashSet<String>,
}

impl ReportSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `record` unless its domain is already present. Returns whether it was kept.
    pub(crate) fn insert(&mut self, record: ContactRecord) -> bool {
        if self.seen_domains.insert(record.domain.clone()) {
            self.records.push(record);
            true
        } else {
            false
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.iter()
    }
}

impl Serialize for ReportSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

/// Classification policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FilterMode {
    /// Records without any contact field are rejected.
    #[default]
    Strict,
    /// Any record with a well-formed URL is kept.
    Relaxed,
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMode::Strict => write!(f, "strict"),
            FilterMode::Relaxed => write!(f, "relaxed"),
        }
    }
}

/// Why a record was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RejectReason {
    /// The domain (or the URL's host) matched this blocklist entry.
    Blocklisted(String),
    /// Strict mode and no contact field was found.
    NoContactFields,
    /// The source URL is not an absolute http(s) URL with a host.
    InvalidUrl,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Blocklisted(entry) => write!(f, "blocklisted ({})", entry),
            RejectReason::NoContactFields => write!(f, "no contact fields"),
            RejectReason::InvalidUrl => write!(f, "invalid URL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Accept,
    Reject(RejectReason),
}

/// Describes a search run for the report header.
#[derive(Serialize, Debug, Clone)]
pub(crate) struct RunMetadata {
    pub keyword: String,
    pub location: String,
    pub mode: FilterMode,
    pub generated_at: DateTime<Local>,
}

impl RunMetadata {
    pub(crate) fn new(keyword: &str, location: &str, mode: FilterMode) -> Self {
        Self {
            keyword: keyword.to_string(),
            location: location.to_string(),
            mode,
            generated_at: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, domain: &str) -> ContactRecord {
        ContactRecord::new(url, domain)
    }

    #[test]
    fn test_report_set_rejects_duplicate_domain() {
        let mut set = ReportSet::new();
        assert!(set.insert(record("https://a.com", "a.com")));
        assert!(set.insert(record("https://b.com", "b.com")));
        assert!(!set.insert(record("https://a.com/contact", "a.com")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_report_set_serializes_as_list() {
        let mut set = ReportSet::new();
        let mut r = record("https://a.com", "a.com");
        r.email = Some("info@a.com".to_string());
        set.insert(r);
        let json = serde_json::to_value(&set).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["email"], "info@a.com");
        assert!(json[0].get("phone").is_none());
    }

    #[test]
    fn test_empty_record_has_no_contact_fields() {
        let mut r = record("https://a.com", "a.com");
        assert!(r.has_no_contact_fields());
        r.phone = Some("555 123 4567".to_string());
        assert!(!r.has_no_contact_fields());
    }
}
