//! Identity registry client and resolver.
//!
//! The registry is an external HTTP service keyed by national ID:
//!
//! ```text
//! GET <base_url>?nrodocumento=<id>
//! ```
//!
//! A 2xx response whose JSON body carries a non-empty `ClienteId` means the
//! identity is known. Anything else (non-2xx, missing or empty `ClienteId`)
//! means "not found" and is not an error.
//!
//! [`resolve`] fans out over many IDs with bounded concurrency. One failing
//! lookup is logged and skipped; it never cancels the others.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::models::IdentityLookupResult;

/// Field whose presence marks an identity as known.
pub const KNOWN_MARKER_FIELD: &str = "ClienteId";

/// A lookup service keyed by national ID.
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Look up one ID.
    ///
    /// `Ok(None)` means the registry does not know the ID. `Err` is reserved
    /// for transport and decoding failures.
    async fn lookup(&self, id: &str) -> Result<Option<Value>>;
}

/// [`IdentityRegistry`] over HTTP.
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    id_param: String,
}

impl HttpRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build registry HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            id_param: config.id_param.clone(),
        })
    }
}

#[async_trait]
impl IdentityRegistry for HttpRegistry {
    async fn lookup(&self, id: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[(self.id_param.as_str(), id)])
            .send()
            .await
            .with_context(|| format!("Registry request failed for {}", id))?;

        if !resp.status().is_success() {
            debug!(id, status = %resp.status(), "registry returned non-success");
            return Ok(None);
        }

        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Registry returned invalid JSON for {}", id))?;

        Ok(if is_known(&body) { Some(body) } else { None })
    }
}

/// Whether a registry payload describes a known identity.
pub fn is_known(body: &Value) -> bool {
    match body.get(KNOWN_MARKER_FIELD) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::Bool(b)) => *b,
        Some(_) => true,
    }
}

/// Resolve `ids` against `registry`.
///
/// At most `concurrency` lookups run at once. Results come back in input
/// order; unknown IDs and failed lookups are left out.
pub async fn resolve(
    registry: &dyn IdentityRegistry,
    ids: &[String],
    concurrency: usize,
) -> Vec<IdentityLookupResult> {
    let outcomes: Vec<Option<IdentityLookupResult>> = stream::iter(ids.iter().cloned())
        .map(|id: String| async move {
            match registry.lookup(&id).await {
                Ok(Some(data)) => Some(IdentityLookupResult {
                    documento: id,
                    data,
                }),
                Ok(None) => {
                    debug!(id = %id, "identity not known to registry");
                    None
                }
                Err(e) => {
                    warn!(id = %id, error = %format!("{:#}", e), "identity lookup failed");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    outcomes.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Canned registry: known IDs answer, IDs in `failing` error out.
    #[derive(Default)]
    struct FakeRegistry {
        known: HashMap<String, Value>,
        failing: Vec<String>,
        delays_ms: HashMap<String, u64>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl IdentityRegistry for FakeRegistry {
        async fn lookup(&self, id: &str) -> Result<Option<Value>> {
            self.calls.lock().unwrap().push(id.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(ms) = self.delays_ms.get(id) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.iter().any(|f| f == id) {
                anyhow::bail!("connection reset");
            }
            Ok(self.known.get(id).cloned())
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_known() {
        assert!(is_known(&json!({"ClienteId": 42})));
        assert!(is_known(&json!({"ClienteId": "A-1"})));
        assert!(!is_known(&json!({"ClienteId": ""})));
        assert!(is_known(&json!({"ClienteId": " "})));
        assert!(!is_known(&json!({"ClienteId": null})));
        assert!(!is_known(&json!({"ClienteId": 0})));
        assert!(!is_known(&json!({"Nombre": "x"})));
        assert!(!is_known(&json!(null)));
        assert!(!is_known(&json!([])));
    }

    #[tokio::test]
    async fn test_resolve_keeps_input_order() {
        let mut reg = FakeRegistry::default();
        reg.known.insert("1".into(), json!({"ClienteId": 1}));
        reg.known.insert("2".into(), json!({"ClienteId": 2}));
        reg.known.insert("3".into(), json!({"ClienteId": 3}));
        reg.delays_ms.insert("1".into(), 60);
        reg.delays_ms.insert("2".into(), 30);

        let out = resolve(&reg, &ids(&["1", "2", "3"]), 3).await;
        let docs: Vec<&str> = out.iter().map(|r| r.documento.as_str()).collect();
        assert_eq!(docs, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_resolve_isolates_failures() {
        let mut reg = FakeRegistry::default();
        reg.known.insert("1".into(), json!({"ClienteId": 1}));
        reg.known.insert("3".into(), json!({"ClienteId": 3}));
        reg.failing.push("2".into());

        let out = resolve(&reg, &ids(&["1", "2", "3"]), 1).await;
        let docs: Vec<&str> = out.iter().map(|r| r.documento.as_str()).collect();
        assert_eq!(docs, vec!["1", "3"]);
        assert_eq!(reg.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_skips_unknown() {
        let reg = FakeRegistry::default();
        let out = resolve(&reg, &ids(&["12345678"]), 4).await;
        assert!(out.is_empty());
        assert_eq!(*reg.calls.lock().unwrap(), vec!["12345678"]);
    }

    #[tokio::test]
    async fn test_resolve_respects_concurrency_bound() {
        let mut reg = FakeRegistry::default();
        for id in ["a", "b", "c", "d", "e"] {
            reg.delays_ms.insert(id.into(), 20);
        }
        resolve(&reg, &ids(&["a", "b", "c", "d", "e"]), 2).await;
        assert!(reg.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_resolve_sequential_when_concurrency_one() {
        let mut reg = FakeRegistry::default();
        reg.delays_ms.insert("a".into(), 10);
        reg.delays_ms.insert("b".into(), 10);
        resolve(&reg, &ids(&["a", "b"]), 1).await;
        assert_eq!(reg.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(*reg.calls.lock().unwrap(), vec!["a", "b"]);
    }

    fn assert_send<T: Send>(_: T) {}

    #[test]
    fn test_resolve_future_is_send() {
        let reg = FakeRegistry::default();
        let ids = ids(&["1"]);
        assert_send(resolve(&reg, &ids, 2));
    }

    #[tokio::test]
    async fn test_resolve_empty_input_makes_no_calls() {
        let reg = FakeRegistry::default();
        assert!(resolve(&reg, &[], 4).await.is_empty());
        assert!(reg.calls.lock().unwrap().is_empty());
    }
}
