//! Processing of a single search candidate: fetch, extract, backfill, translate, classify.

use crate::domain::{get_domain_from_url, normalize_url};
use crate::error::FetchError;
use crate::models::{ContactRecord, FilterMode, RejectReason, SearchCandidate, Verdict};
use crate::patterns::{
    clean_field, find_address, find_emails, find_phone, normalize_whitespace, select_email,
    truncate_chars,
};
use crate::pipeline::Pipeline;
use crate::translate::localize_record;

/// What became of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CandidateOutcome {
    /// The record passed classification.
    Accepted(ContactRecord),
    /// The record (or the bare URL, before fetching) was rejected.
    Rejected { url: String, reason: RejectReason },
    /// The page could not be retrieved; no record exists for this candidate.
    FetchFailed { url: String, error: FetchError },
}

/// Fills fields the page did not yield from the search result title and snippet.
pub(crate) fn backfill_from_candidate(
    record: &mut ContactRecord,
    candidate: &SearchCandidate,
    max_name_length: usize,
    max_address_length: usize,
) {
    if record.company_name.is_none() {
        record.company_name = clean_field(&candidate.title)
            .and_then(|t| crate::extractor::strip_title_boilerplate(&t))
            .map(|t| truncate_chars(&t, max_name_length));
    }

    let snippet = normalize_whitespace(&candidate.snippet);
    if snippet.is_empty() {
        return;
    }
    if record.email.is_none() {
        record.email = select_email(&find_emails(&snippet), &record.domain);
    }
    if record.phone.is_none() {
        record.phone = find_phone(&snippet);
    }
    if record.address.is_none() {
        record.address = find_address(&snippet, max_address_length);
    }
}

/// Runs one candidate through the per-page stages. Never fails: every failure
/// is folded into the returned outcome.
///
/// # Arguments
/// * `pipeline` - Shared collaborators and configuration.
/// * `rank` - Zero-based position of the candidate in the search results, used in logs.
/// * `candidate` - The search result to process.
/// * `mode` - Filtering policy applied by the classifier.
///
/// # Returns
/// * `CandidateOutcome::Accepted` with the extracted record.
/// * `CandidateOutcome::Rejected` when blocklisted, malformed or empty under `Strict`.
/// * `CandidateOutcome::FetchFailed` when the page could not be retrieved.
pub(crate) async fn process_candidate(
    pipeline: &Pipeline,
    rank: usize,
    candidate: SearchCandidate,
    mode: FilterMode,
) -> CandidateOutcome {
    let task_id = format!("#{} {}", rank + 1, candidate.url);
    tracing::info!(target: "process_candidate_task", "[{}] Starting processing.", task_id);

    if let Some(reason) = pipeline.classifier.screen_url(&candidate.url) {
        tracing::info!(target: "process_candidate_task",
            "[{}] Skipping before fetch: {}", task_id, reason
        );
        return CandidateOutcome::Rejected {
            url: candidate.url,
            reason,
        };
    }

    let url = match normalize_url(&candidate.url) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(target: "process_candidate_task",
                "[{}] Invalid candidate URL: {}", task_id, e
            );
            return CandidateOutcome::Rejected {
                url: candidate.url,
                reason: RejectReason::InvalidUrl,
            };
        }
    };

    let page = match pipeline.fetcher.fetch(&url).await {
        Ok(page) => page,
        Err(error) => {
            tracing::warn!(target: "process_candidate_task",
                "[{}] Fetch failed, no record produced: {}", task_id, error
            );
            return CandidateOutcome::FetchFailed {
                url: candidate.url,
                error,
            };
        }
    };

    tracing::debug!(target: "process_candidate_task",
        "[{}] Decoded {} bytes as {} (declared charset: {:?})",
        task_id, page.bytes.len(), page.encoding, page.declared_charset
    );

    // The parsed document is not Send; extraction must finish before the next await.
    let mut record = pipeline.extractor.extract(&page);
    if record.domain.is_empty() {
        record.domain = get_domain_from_url(&candidate.url).unwrap_or_default();
    }

    let config = &pipeline.config;
    if config.snippet_backfill {
        backfill_from_candidate(
            &mut record,
            &candidate,
            config.max_name_length,
            config.max_address_length,
        );
    }

    localize_record(&mut record, pipeline.translator.as_ref(), &config.target_language).await;

    match pipeline.classifier.classify(&record, mode) {
        Verdict::Accept => {
            tracing::info!(target: "process_candidate_task",
                "[{}] ✓ Accepted {} (name: {:?}, email: {:?})",
                task_id, record.domain, record.company_name, record.email
            );
            CandidateOutcome::Accepted(record)
        }
        Verdict::Reject(reason) => {
            tracing::info!(target: "process_candidate_task",
                "[{}] ✗ Rejected {}: {}", task_id, record.domain, reason
            );
            CandidateOutcome::Rejected {
                url: record.source_url,
                reason,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backfill_uses_title_and_snippet() {
        let mut record = ContactRecord::new("https://example-law.com/", "example-law.com");
        let candidate = SearchCandidate::new(
            "http://example-law.com",
            "Example Law Firm - Home",
            "Call (555) 123-4567 or email contact@example-law.com. 1200 Market Street, Springfield, IL 62704",
        );
        backfill_from_candidate(&mut record, &candidate, 120, 200);
        assert_eq!(record.company_name.as_deref(), Some("Example Law Firm"));
        assert_eq!(record.email.as_deref(), Some("contact@example-law.com"));
        assert_eq!(record.phone.as_deref(), Some("(555) 123-4567"));
        assert_eq!(
            record.address.as_deref(),
            Some("1200 Market Street, Springfield, IL 62704")
        );
    }

    #[test]
    fn test_backfill_keeps_extracted_values() {
        let mut record = ContactRecord {
            company_name: Some("From Page".to_string()),
            phone: Some("+1 555 000 1111".to_string()),
            ..ContactRecord::new("https://acme.com/", "acme.com")
        };
        let candidate = SearchCandidate::new("https://acme.com", "From Search", "Call (555) 123-4567");
        backfill_from_candidate(&mut record, &candidate, 120, 200);
        assert_eq!(record.company_name.as_deref(), Some("From Page"));
        assert_eq!(record.phone.as_deref(), Some("+1 555 000 1111"));
        assert_eq!(record.email, None);
    }

    #[test]
    fn test_backfill_ignores_null_markers() {
        let mut record = ContactRecord::new("https://acme.com/", "acme.com");
        let candidate = SearchCandidate::new("https://acme.com", "N/A", "");
        backfill_from_candidate(&mut record, &candidate, 120, 200);
        assert!(record.has_no_contact_fields());
    }
}
