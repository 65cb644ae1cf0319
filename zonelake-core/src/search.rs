//! Linear metadata search over a zone listing.
//!
//! One `head` call is made per listed object, so cost grows with the number
//! of objects in scope. Objects whose metadata cannot be fetched are logged
//! and skipped.

use tracing::{debug, info, warn};

use crate::contract::{Metadata, ObjectInfo, ObjectStore};
use crate::error::Result;
use crate::lake::DataLake;

/// True when every filter key is present in `metadata` with exactly the same
/// value (case-sensitive, no wildcards). An empty filter set matches.
pub fn matches_filters(metadata: &Metadata, filters: &Metadata) -> bool {
    filters
        .iter()
        .all(|(key, wanted)| metadata.get(key) == Some(wanted))
}

impl<S: ObjectStore> DataLake<S> {
    /// Objects under `zone` (or the whole store) whose metadata matches all
    /// `filters`, in listing order.
    pub async fn search_by_metadata(
        &self,
        filters: &Metadata,
        zone: Option<&str>,
    ) -> Result<Vec<ObjectInfo>> {
        let candidates = self.list_files(zone, None).await?;
        debug!(candidates = candidates.len(), ?filters, "Searching metadata");

        let mut found = Vec::new();
        for object in candidates {
            let head = match self.get_file_metadata(&object.key).await {
                Ok(head) => head,
                Err(e) => {
                    warn!(key = %object.key, error = %e, "Skipping object with unreadable metadata");
                    continue;
                }
            };
            if matches_filters(&head.metadata, filters) {
                found.push(object);
            }
        }

        info!(matches = found.len(), zone = zone.unwrap_or("*"), "Metadata search finished");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(pairs: &[(&str, &str)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn all_filters_must_match_exactly() {
        let metadata = md(&[("processor", "dedupe"), ("processing_step", "step_1")]);
        assert!(matches_filters(&metadata, &md(&[("processor", "dedupe")])));
        assert!(!matches_filters(&metadata, &md(&[("processor", "Dedupe")])));
        assert!(!matches_filters(
            &metadata,
            &md(&[("processor", "dedupe"), ("owner", "ops")])
        ));
        assert!(matches_filters(&metadata, &Metadata::new()));
    }
}
