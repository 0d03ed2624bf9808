//! Bounded log of completed compressions, newest first.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::AppError;
use crate::storage::KeyValueStore;

pub const HISTORY_CAPACITY: usize = 10;
pub const HISTORY_STORE_KEY: &str = "fitSize.history";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: u64,
    pub file_name: String,
    pub original_size: u64,
    pub compressed_size: u64,
    /// RFC 3339, UTC.
    pub created_at: String,
}

#[derive(Default)]
pub struct HistoryLedger {
    records: VecDeque<HistoryRecord>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for HistoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLedger")
            .field("records", &self.records)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger backed by `store`. Existing records are loaded; an unreadable entry starts
    /// the ledger empty rather than failing.
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        let records = match Self::load(store.as_ref()) {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    target: "fit_size::history",
                    "Could not load history, starting empty: {}",
                    e
                );
                VecDeque::new()
            }
        };
        Self {
            records,
            store: Some(store),
        }
    }

    fn load(store: &dyn KeyValueStore) -> Result<VecDeque<HistoryRecord>, AppError> {
        let Some(value) = store.get(HISTORY_STORE_KEY)? else {
            return Ok(VecDeque::new());
        };
        let mut records: VecDeque<HistoryRecord> = serde_json::from_value(value)
            .map_err(|e| AppError::Unknown(format!("Invalid history record: {}", e)))?;
        records.truncate(HISTORY_CAPACITY);
        Ok(records)
    }

    fn save(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = serde_json::to_value(&self.records)
            .map_err(|e| AppError::Unknown(e.to_string()))
            .and_then(|value| store.set(HISTORY_STORE_KEY, value));
        if let Err(e) = result {
            log::warn!(
                target: "fit_size::history",
                "Failed to persist history: {}",
                e
            );
        }
    }

    fn next_id(&self) -> u64 {
        let last = self.records.front().map(|r| r.id).unwrap_or(0);
        now_millis().max(last + 1)
    }

    /// Insert `record` at the front, evicting the oldest beyond capacity.
    pub fn append(&mut self, record: HistoryRecord) -> Vec<HistoryRecord> {
        self.records.push_front(record);
        self.records.truncate(HISTORY_CAPACITY);
        self.save();
        self.records()
    }

    /// Build a record stamped with a fresh id and the current time, then append it.
    pub fn record(&mut self, file_name: &str, original_size: u64, compressed_size: u64) -> HistoryRecord {
        let record = HistoryRecord {
            id: self.next_id(),
            file_name: file_name.to_string(),
            original_size,
            compressed_size,
            created_at: now_rfc3339(),
        };
        self.append(record.clone());
        record
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
