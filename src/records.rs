//! Local record index.
//!
//! The dataset is a JSON array of flat objects, loaded once at startup and
//! never mutated afterwards, so the index is shared across requests without
//! locking.
//!
//! ```json
//! [
//!   { "Codigo": "2015100234", "Nro Documento": "45872210", "Nombres": "..." },
//!   { "Codigo": "1720300112", "Nombres": "..." }
//! ]
//! ```

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::models::LocalRecord;

/// Field matched against code queries.
pub const CODE_FIELD: &str = "Codigo";

/// Field holding the national ID used for identity resolution.
pub const DOCUMENT_FIELD: &str = "Nro Documento";

/// Read-only, in-memory record set.
#[derive(Debug, Default)]
pub struct RecordIndex {
    records: Vec<LocalRecord>,
}

impl RecordIndex {
    pub fn new(records: Vec<LocalRecord>) -> Self {
        Self { records }
    }

    /// Load the dataset from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read record dataset: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse record dataset: {}", path.display()))
    }

    /// Parse a dataset from its JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        let Value::Array(items) = value else {
            bail!("record dataset must be a JSON array");
        };

        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(record) => records.push(record),
                other => bail!("record {} is not an object: {}", i, other),
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record whose code contains `query`, case-insensitively, in
    /// dataset order.
    pub fn find_by_code(&self, query: &str) -> Vec<&LocalRecord> {
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                field_text(record, CODE_FIELD)
                    .unwrap_or_default()
                    .to_lowercase()
                    .contains(&needle)
            })
            .collect()
    }
}

/// National IDs attached to `records`, in order. Records without a
/// non-empty [`DOCUMENT_FIELD`] contribute nothing.
pub fn document_ids<'a>(records: impl IntoIterator<Item = &'a LocalRecord>) -> Vec<String> {
    records
        .into_iter()
        .filter_map(|record| field_text(record, DOCUMENT_FIELD))
        .collect()
}

/// Render a string or numeric field as text. Empty strings and zero are
/// treated as absent.
fn field_text(record: &LocalRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(number_text(n)),
        _ => None,
    }
}

/// Integral values render without a fraction, so `45872210.0` (common in
/// spreadsheet exports) becomes `45872210`.
fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        _ => n.to_string(),
    }
}
