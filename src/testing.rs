//! In-memory stand-ins for the storage backend and the identity registry.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use crate::registry::IdentityRegistry;
use crate::storage::{ListPage, ListingError, ObjectStore};

/// Keys are kept sorted, like an S3 listing. Continuation tokens are plain
/// offsets into the filtered key list.
pub(crate) struct FakeStore {
    keys: BTreeSet<String>,
    page_size: usize,
    failing: Vec<String>,
    malformed: Vec<String>,
    calls: Mutex<Vec<String>>,
    puts: Mutex<Vec<(String, usize, String)>>,
}

impl FakeStore {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            keys: BTreeSet::new(),
            page_size,
            failing: Vec::new(),
            malformed: Vec::new(),
            calls: Mutex::new(Vec::new()),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub(crate) fn failing_prefix(mut self, prefix: &str) -> Self {
        self.failing.push(prefix.to_string());
        self
    }

    pub(crate) fn malformed_prefix(mut self, prefix: &str) -> Self {
        self.malformed.push(prefix.to_string());
        self
    }

    /// Prefix of every list call, in call order.
    pub(crate) fn listed_prefixes(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(key, body length, content type)` of every upload.
    pub(crate) fn puts(&self) -> Vec<(String, usize, String)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, ListingError> {
        self.calls.lock().unwrap().push(prefix.to_string());

        if self.failing.iter().any(|p| p == prefix) {
            return Err(ListingError::Status {
                prefix: prefix.to_string(),
                status: 503,
                body: "SlowDown".to_string(),
            });
        }
        if self.malformed.iter().any(|p| p == prefix) {
            return Err(ListingError::Malformed {
                prefix: prefix.to_string(),
                reason: "missing <ListBucketResult> element".to_string(),
            });
        }

        let matching: Vec<&String> = self.keys.iter().filter(|k| k.starts_with(prefix)).collect();
        let start = continuation
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(0)
            .min(matching.len());
        let end = (start + self.page_size).min(matching.len());

        Ok(ListPage {
            keys: matching[start..end].iter().map(|k| k.to_string()).collect(),
            next_continuation: (end < matching.len()).then(|| end.to_string()),
        })
    }

    fn presign_get(&self, key: &str, expires_secs: u64) -> Result<String> {
        Ok(format!("fake://{}?expires={}", key, expires_secs))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), body.len(), content_type.to_string()));
        Ok(())
    }
}

/// Registry answering from a fixed map, recording every lookup.
#[derive(Default)]
pub(crate) struct StaticRegistry {
    known: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl StaticRegistry {
    pub(crate) fn with(mut self, id: &str, data: Value) -> Self {
        self.known.insert(id.to_string(), data);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityRegistry for StaticRegistry {
    async fn lookup(&self, id: &str) -> Result<Option<Value>> {
        self.calls.lock().unwrap().push(id.to_string());
        Ok(self.known.get(id).cloned())
    }
}
