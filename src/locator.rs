//! Object locator.
//!
//! Walks the year partitions in order, pages through the keys under
//! `<namespace>/<year>/`, and stops at the first key containing the query.
//! The match is returned with a presigned `GET` URL.
//!
//! A partition whose listing fails (network error or non-success status) is
//! skipped. A listing body that cannot be parsed aborts the search.
//!
//! Listings are followed across pages until exhausted. Pages are scanned as
//! they arrive, so no further page (and no later partition) is requested once
//! a match is found.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::models::{ObjectMatch, PartitionId};
use crate::storage::{ListingError, ObjectStore};

/// Key prefix of one partition, always ending in `/`.
pub fn partition_prefix(namespace: &str, partition: PartitionId) -> String {
    format!("{}/{}/", namespace.trim_matches('/'), partition)
}

/// Find the first object whose key contains `query` (case-insensitive)
/// across `partitions`, and sign a URL for it valid for `ttl_secs`.
pub async fn locate(
    store: &dyn ObjectStore,
    namespace: &str,
    query: &str,
    partitions: &[PartitionId],
    ttl_secs: u64,
) -> Result<Option<ObjectMatch>> {
    let needle = query.to_lowercase();

    for &partition in partitions {
        let prefix = partition_prefix(namespace, partition);

        let found = match find_in_prefix(store, &prefix, &needle).await {
            Ok(found) => found,
            Err(e) if e.is_partial() => {
                warn!(partition, error = %e, "skipping partition");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(key) = found {
            let url = store.presign_get(&key, ttl_secs)?;
            info!(partition, key = %key, "object matched");
            return Ok(Some(ObjectMatch { name: key, url }));
        }

        debug!(partition, "no matching object");
    }

    Ok(None)
}

async fn find_in_prefix(
    store: &dyn ObjectStore,
    prefix: &str,
    needle: &str,
) -> Result<Option<String>, ListingError> {
    let mut continuation: Option<String> = None;

    loop {
        let page = store.list_page(prefix, continuation.as_deref()).await?;

        if let Some(key) = page
            .keys
            .into_iter()
            .find(|key| key.to_lowercase().contains(needle))
        {
            return Ok(Some(key));
        }

        match page.next_continuation {
            Some(token) => continuation = Some(token),
            None => return Ok(None),
        }
    }
}
