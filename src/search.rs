//! Search orchestration and response assembly.
//!
//! ```text
//!  raw query ──▶ classify ──┬─▶ record index (codes only) ──▶ document ids ─┐
//!                           │                                              ▼
//!                           │                                   identity resolver ─┐
//!                           └─▶ partition list ──▶ object locator ─────────────────┤
//!                                                                                  ▼
//!                                                                            assemble
//! ```
//!
//! Identity resolution and object location have no ordering dependency and
//! run concurrently. Dropping the returned future (for example when the HTTP
//! client disconnects) cancels both.

use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::classify::{classify, partitions_for};
use crate::config::Config;
use crate::locator::locate;
use crate::models::{
    IdentityLookupResult, LocalRecord, ObjectMatch, QueryKind, SearchResult, SIGNED_URL_TTL_SECS,
};
use crate::records::{document_ids, RecordIndex};
use crate::registry::{resolve, HttpRegistry, IdentityRegistry};
use crate::storage::{ObjectStore, S3Store};

/// Ways a search can fail as a whole.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Query parameter 'q' is required")]
    EmptyQuery,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Tunables taken from the config file.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Top-level key prefix of the partitions.
    pub namespace: String,
    /// Registry lookups in flight per search.
    pub registry_concurrency: usize,
    /// Search storage for national-ID queries as well as codes.
    pub locate_national_ids: bool,
}

impl SearchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.storage.namespace.clone(),
            registry_concurrency: config.registry.concurrency,
            locate_national_ids: config.search.locate_national_ids,
        }
    }
}

/// Everything a search needs, built once per process and shared.
pub struct Searcher {
    records: Arc<RecordIndex>,
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn IdentityRegistry>,
    options: SearchOptions,
}

impl Searcher {
    pub fn new(
        records: Arc<RecordIndex>,
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn IdentityRegistry>,
        options: SearchOptions,
    ) -> Self {
        Self {
            records,
            store,
            registry,
            options,
        }
    }

    /// Load the record dataset and build the storage and registry clients.
    pub fn from_config(config: &Config) -> Result<Self> {
        let records = RecordIndex::load(&config.records.path)?;
        info!(records = records.len(), "record index loaded");

        let store = S3Store::from_env(&config.storage)?;
        let registry = HttpRegistry::new(&config.registry)?;

        Ok(Self::new(
            Arc::new(records),
            Arc::new(store),
            Arc::new(registry),
            SearchOptions::from_config(config),
        ))
    }

    /// Run one search.
    pub async fn search(&self, raw: &str) -> Result<SearchResult, SearchError> {
        if raw.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let query = classify(raw);

        let db_matches: Vec<&LocalRecord> = match query.kind {
            QueryKind::Code => self.records.find_by_code(&query.lowered),
            QueryKind::NationalId => Vec::new(),
        };

        let ids = match query.kind {
            QueryKind::NationalId => vec![query.raw.clone()],
            QueryKind::Code => document_ids(db_matches.iter().copied()),
        };

        let partitions = match query.kind {
            QueryKind::NationalId if !self.options.locate_national_ids => Vec::new(),
            _ => partitions_for(query.partition_hint),
        };

        info!(
            kind = ?query.kind,
            hint = ?query.partition_hint,
            records = db_matches.len(),
            lookups = ids.len(),
            partitions = partitions.len(),
            "searching"
        );

        let (identities, image) = tokio::join!(
            resolve(
                self.registry.as_ref(),
                &ids,
                self.options.registry_concurrency
            ),
            locate(
                self.store.as_ref(),
                &self.options.namespace,
                &query.lowered,
                &partitions,
                SIGNED_URL_TTL_SECS,
            ),
        );

        Ok(assemble(
            db_matches.into_iter().cloned().collect(),
            identities,
            image?,
        ))
    }
}

/// Merge the three result sets, reporting empty lookups as `null`.
pub fn assemble(
    db_results: Vec<LocalRecord>,
    intranet_results: Vec<IdentityLookupResult>,
    image: Option<ObjectMatch>,
) -> SearchResult {
    SearchResult {
        images: image.into_iter().collect(),
        db_results: (!db_results.is_empty()).then_some(db_results),
        intranet_results: (!intranet_results.is_empty()).then_some(intranet_results),
    }
}
