//! Decides whether a record represents a genuine company site.

use crate::domain::{get_host_from_url, is_well_formed_url};
use crate::models::{ContactRecord, FilterMode, RejectReason, Verdict};
use once_cell::sync::Lazy;
use std::collections::BTreeSet;

/// Social networks, directories, marketplaces and reference sites that never
/// count as a company's own website.
pub(crate) static DEFAULT_BLOCKLIST: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        // Social media
        "facebook.com",
        "twitter.com",
        "x.com",
        "linkedin.com",
        "instagram.com",
        "youtube.com",
        "pinterest.com",
        "tiktok.com",
        "reddit.com",
        // Directories and listings
        "yelp.com",
        "yellowpages.com",
        "tripadvisor.com",
        "foursquare.com",
        "manta.com",
        "bbb.org",
        "angieslist.com",
        "thumbtack.com",
        "mapquest.com",
        "whitepages.com",
        // General, news, marketplaces
        "wikipedia.org",
        "medium.com",
        "amazon.com",
        "ebay.com",
        "etsy.com",
        "craigslist.org",
        "indeed.com",
        "glassdoor.com",
    ]
    .into_iter()
    .collect()
});

/// Immutable set of blocked domains. Matching is exact or on a dot-separated
/// suffix, so `business.facebook.com` is blocked but `notfacebook.com` is not.
#[derive(Debug, Clone)]
pub(crate) struct Blocklist {
    entries: BTreeSet<String>,
}

impl Blocklist {
    /// The built-in list plus `extra` entries (lowercased, leading "www." and dots removed).
    pub(crate) fn with_defaults<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: BTreeSet<String> = DEFAULT_BLOCKLIST.iter().map(|d| d.to_string()).collect();
        entries.extend(extra.into_iter().filter_map(|d| {
            let d = d.as_ref().trim().trim_matches('.').to_lowercase();
            let d = d.strip_prefix("www.").map(str::to_string).unwrap_or(d);
            (!d.is_empty()).then_some(d)
        }));
        Self { entries }
    }

    /// Returns the entry that blocks `host`, if any.
    pub(crate) fn matches(&self, host: &str) -> Option<&str> {
        let host = host.trim_end_matches('.').to_lowercase();
        if let Some(entry) = self.entries.get(host.as_str()) {
            return Some(entry.as_str());
        }
        // Walk parent domains: a.b.c.com -> b.c.com -> c.com -> com.
        let mut rest = host.as_str();
        while let Some((_, parent)) = rest.split_once('.') {
            if let Some(entry) = self.entries.get(parent) {
                return Some(entry.as_str());
            }
            rest = parent;
        }
        None
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Pure accept/reject decision, parameterized by `FilterMode`.
#[derive(Debug, Clone)]
pub(crate) struct Classifier {
    blocklist: Blocklist,
}

impl Classifier {
    pub(crate) fn new(blocklist: Blocklist) -> Self {
        Self { blocklist }
    }

    /// Blocklist check on a URL alone, used to skip candidates before fetching.
    pub(crate) fn screen_url(&self, url: &str) -> Option<RejectReason> {
        let host = get_host_from_url(url).ok()?;
        self.blocklist
            .matches(&host)
            .map(|entry| RejectReason::Blocklisted(entry.to_string()))
    }

    pub(crate) fn classify(&self, record: &ContactRecord, mode: FilterMode) -> Verdict {
        if let Some(entry) = self.blocklist.matches(&record.domain) {
            return Verdict::Reject(RejectReason::Blocklisted(entry.to_string()));
        }
        if let Some(reason) = self.screen_url(&record.source_url) {
            return Verdict::Reject(reason);
        }

        if !is_well_formed_url(&record.source_url) {
            return Verdict::Reject(RejectReason::InvalidUrl);
        }

        match mode {
            FilterMode::Strict if record.has_no_contact_fields() => {
                Verdict::Reject(RejectReason::NoContactFields)
            }
            FilterMode::Strict | FilterMode::Relaxed => Verdict::Accept,
        }
    }
}
