//! First-seen-wins deduplication by registrable domain.

use crate::models::{ContactRecord, ReportSet};

/// Keeps the first record of each domain in input order. Later duplicates are
/// dropped whole; fields are never merged across them.
pub(crate) fn dedupe<I>(records: I) -> ReportSet
where
    I: IntoIterator<Item = ContactRecord>,
{
    let mut set = ReportSet::new();
    for record in records {
        let domain = record.domain.clone();
        let source = record.source_url.clone();
        if !set.insert(record) {
            tracing::debug!(target: "pipeline_task",
                "Dropping duplicate of {} from {}", domain, source
            );
        }
    }
    set
}
