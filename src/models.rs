//! Core data models used throughout Record Locator.
//!
//! These types describe a classified query and the three result sets that a
//! search merges into a single [`SearchResult`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First storage partition (year) that holds scanned records.
pub const FIRST_PARTITION: PartitionId = 2007;

/// Last storage partition (year) that holds scanned records.
pub const LAST_PARTITION: PartitionId = 2025;

/// Lifetime of a signed retrieval URL, in seconds.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// A storage partition, identified by its year.
pub type PartitionId = u16;

/// A record from the local dataset. Field order is preserved as loaded.
pub type LocalRecord = serde_json::Map<String, Value>;

/// What a query looks like once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Exactly eight ASCII digits.
    NationalId,
    /// Anything else; matched by substring against record codes and object keys.
    Code,
}

/// A trimmed query together with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedQuery {
    /// The trimmed query as typed. Sent verbatim to the identity registry.
    pub raw: String,
    /// Lower-cased form used for every substring match.
    pub lowered: String,
    pub kind: QueryKind,
    /// Partition encoded in the query prefix, if any.
    pub partition_hint: Option<PartitionId>,
}

/// An identity the external registry reported as known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityLookupResult {
    /// The national ID that was looked up.
    pub documento: String,
    /// Raw registry payload.
    pub data: Value,
}

/// A stored object whose key matched the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMatch {
    /// Full object key, including the namespace and partition prefix.
    pub name: String,
    /// Presigned GET URL, valid for [`SIGNED_URL_TTL_SECS`].
    pub url: String,
}

/// The response body of a search.
///
/// `db_results` and `intranet_results` are never `Some(vec![])`: an empty
/// lookup is reported as `null`. `images` is always an array with zero or one
/// element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub images: Vec<ObjectMatch>,
    pub db_results: Option<Vec<LocalRecord>>,
    pub intranet_results: Option<Vec<IdentityLookupResult>>,
}
