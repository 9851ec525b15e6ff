//! Pattern matchers and validators for contact fields found in page text.

use crate::domain::registrable_domain;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

pub(crate) static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b")
        .expect("Failed to compile email regex pattern. This should not happen.")
});

static EMAIL_FULL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9\-]+(?:\.[a-z0-9\-]+)*\.[a-z]{2,}$")
        .expect("Failed to compile strict email regex")
});

/// North American format, e.g. "+1 (555) 123-4567", "555.123.4567".
static PHONE_NANP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?1[\s.\-]?)?\(?\d{3}\)?[\s.\-]?\d{3}[\s.\-]\d{4}")
        .expect("Failed to compile NANP phone regex")
});

/// Numbers with an explicit country code, e.g. "+44 20 7946 0958", "+49 (0)30 1234567".
static PHONE_INTL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\+\d{1,3}[\s.\-]?(?:\(\d{1,4}\)[\s.\-]?)?\d{1,5}(?:[\s.\-/]?\d{1,5}){1,5}")
        .expect("Failed to compile international phone regex")
});

/// National numbers with a trunk prefix, e.g. "01 42 14 20 00", "(030) 123 4567".
static PHONE_NATIONAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(?0\d{1,4}\)?[\s.\-/]\d{2,8}(?:[\s.\-]\d{2,4}){0,3}")
        .expect("Failed to compile national phone regex")
});

static DATE_LIKE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:19|20)\d{2}[./\-]\d{1,2}[./\-]\d{1,2}|\d{1,2}[./\-]\d{1,2}[./\-](?:19|20)?\d{2})$")
        .expect("Failed to compile date regex")
});

static YEAR_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:19|20)\d{2}\s*[\-–]\s*(?:19|20)\d{2}$").expect("Failed to compile year range regex")
});

static ZIP_LIKE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5}(?:-\d{4})?$").expect("Failed to compile zip regex"));

/// "123 Main Street, Suite 4, Springfield, IL 62704".
static ADDRESS_US_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d{1,6}\s+(?:[A-Za-z0-9.'#\-]+\s+){0,5}?(?i:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|way|court|ct|place|pl|parkway|pkwy|highway|hwy|square|sq|terrace|circle|cir|trail|plaza)\b\.?(?:,?\s*(?i:suite|ste|unit|floor|fl)\.?\s*#?[A-Za-z0-9\-]+)?(?:,?\s+[A-Za-z][A-Za-z .'\-]{1,40}?,?\s+[A-Z]{2}\s+\d{5}(?:-\d{4})?)?",
    )
    .expect("Failed to compile US address regex")
});

/// "Hauptstraße 12, 10115 Berlin".
static ADDRESS_DE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[\p{L}\-]*(?i:straße|strasse|str\.|weg|platz|gasse|allee|ring|damm)\s*\d{1,4}\s?[a-zA-Z]?(?:,\s*|\s+)\d{4,5}\s+\p{Lu}[\p{L}\-]+",
    )
    .expect("Failed to compile DE address regex")
});

/// "12 rue de la Paix, 75002 Paris".
static ADDRESS_FR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b\d{1,4}(?:\s?(?:bis|ter))?,?\s+(?i:rue|avenue|av\.|boulevard|bd|place|chemin|allée|quai|impasse|route)\s+[\p{L}'’ .\-]{2,60}?,?\s+\d{5}\s+\p{Lu}[\p{L}\-]+",
    )
    .expect("Failed to compile FR address regex")
});

const PLACEHOLDER_EMAIL_DOMAINS: &[&str] = &[
    "example.com",
    "example.org",
    "example.net",
    "test.com",
    "domain.com",
    "yourdomain.com",
    "yoursite.com",
    "yourcompany.com",
    "company.com",
    "email.com",
    "mysite.com",
    "sentry.io",
    "wixpress.com",
];

const PLACEHOLDER_EMAIL_LOCALS: &[&str] = &[
    "yourname",
    "your.name",
    "your-name",
    "youremail",
    "your.email",
    "username",
    "someone",
    "john.doe",
    "johndoe",
    "jane.doe",
    "firstname.lastname",
    "first.last",
];

const ASSET_SUFFIXES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".avif", ".bmp", ".ico", ".css", ".js",
];

const NULL_MARKERS: &[&str] = &["none", "null", "n/a", "na", "-", "undefined"];

/// Collapses runs of whitespace into single spaces and trims.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_chars` characters, on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Normalizes an extracted value; empty strings and null markers ("N/A", "null") become `None`.
pub(crate) fn clean_field(value: &str) -> Option<String> {
    let value = normalize_whitespace(value);
    let lower = value.to_lowercase();
    if value.is_empty() || NULL_MARKERS.contains(&lower.as_str()) {
        None
    } else {
        Some(value)
    }
}

/// True for addresses that are obviously templates, widgets or asset file names.
pub(crate) fn is_placeholder_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return true;
    };
    if ASSET_SUFFIXES.iter().any(|s| email.ends_with(s)) {
        return true;
    }
    if PLACEHOLDER_EMAIL_LOCALS.contains(&local) {
        return true;
    }
    PLACEHOLDER_EMAIL_DOMAINS
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{}", d)))
}

/// Turns a raw candidate (possibly a `mailto:` target) into a lowercase address,
/// or `None` when it is malformed or a placeholder.
pub(crate) fn normalize_email(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix("mailto:")
        .or_else(|| raw.strip_prefix("MAILTO:"))
        .unwrap_or(raw);
    let address = raw.split('?').next().unwrap_or("").trim();
    let address = percent_decode_at(address).to_lowercase();
    let address = address.trim_matches(|c: char| c == '.' || c == ',' || c == ';');

    if !EMAIL_FULL_REGEX.is_match(address) {
        tracing::debug!(target: "extract_task", "Rejected malformed email candidate: {}", raw);
        return None;
    }
    if is_placeholder_email(address) {
        tracing::debug!(target: "extract_task", "Rejected placeholder email: {}", address);
        return None;
    }
    Some(address.to_string())
}

fn percent_decode_at(s: &str) -> String {
    s.replace("%40", "@").replace("%20", "")
}

/// All valid email addresses in `text`, in order of appearance, without duplicates.
pub(crate) fn find_emails(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    EMAIL_REGEX
        .find_iter(text)
        .filter_map(|m| normalize_email(m.as_str()))
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// True when the email's domain belongs to the same registrable domain as the site.
pub(crate) fn is_same_site_email(email: &str, site_domain: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, d)| registrable_domain(d) == site_domain)
        .unwrap_or(false)
}

/// Picks the best address: the first on the site's own domain, else the first third-party one.
pub(crate) fn select_email(candidates: &[String], site_domain: &str) -> Option<String> {
    candidates
        .iter()
        .find(|e| is_same_site_email(e, site_domain))
        .or_else(|| candidates.first())
        .cloned()
}

fn has_numeric_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before_ok = text[..start]
        .chars()
        .next_back()
        .is_none_or(|c| !c.is_alphanumeric() && c != '+' && c != '-' && c != '/');
    let after_ok = text[end..]
        .chars()
        .next()
        .is_none_or(|c| !c.is_ascii_digit() && !c.is_alphabetic());
    before_ok && after_ok
}

/// Validates a phone-shaped match. Returns the normalized text when plausible.
pub(crate) fn validate_phone(candidate: &str) -> Option<String> {
    let candidate = normalize_whitespace(candidate.trim_matches(|c: char| {
        c.is_whitespace() || c == '.' || c == '-' || c == '/'
    }));
    let digits: String = candidate.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() < 7 || digits.len() > 15 {
        return None;
    }
    if DATE_LIKE_REGEX.is_match(&candidate)
        || YEAR_RANGE_REGEX.is_match(&candidate)
        || ZIP_LIKE_REGEX.is_match(&candidate)
    {
        return None;
    }
    let first = digits.chars().next()?;
    if digits.chars().all(|c| c == first) {
        return None;
    }
    // Balanced parentheses only.
    let open = candidate.matches('(').count();
    let close = candidate.matches(')').count();
    if open != close {
        return None;
    }
    Some(candidate)
}

/// Finds the first plausible phone number in `text`.
pub(crate) fn find_phone(text: &str) -> Option<String> {
    for regex in [&*PHONE_INTL_REGEX, &*PHONE_NANP_REGEX, &*PHONE_NATIONAL_REGEX] {
        for m in regex.find_iter(text) {
            if !has_numeric_boundaries(text, m.start(), m.end()) {
                continue;
            }
            if let Some(phone) = validate_phone(m.as_str()) {
                return Some(phone);
            }
        }
    }
    None
}

/// Finds the first address-shaped span in `text`, cut to `max_len` characters.
pub(crate) fn find_address(text: &str, max_len: usize) -> Option<String> {
    for regex in [&*ADDRESS_US_REGEX, &*ADDRESS_DE_REGEX, &*ADDRESS_FR_REGEX] {
        if let Some(m) = regex.find(text) {
            let address = normalize_whitespace(m.as_str());
            let address = address.trim_end_matches([',', ';', ' ']);
            if address.chars().filter(|c| c.is_alphabetic()).count() >= 4 {
                return Some(truncate_chars(address, max_len));
            }
        }
    }
    None
}
