//! Per-run accumulated pipeline state.
//!
//! Each catalog migration run owns an isolated record set keyed by a
//! caller-supplied run id, so overlapping runs cannot interleave. A stage
//! replaces the record set wholesale on success and leaves it untouched on
//! failure; there is no persistence across process restarts.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::record::ProductRecord;

#[derive(Debug, Default)]
pub struct SessionStore {
    runs: Mutex<HashMap<String, Vec<ProductRecord>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the accumulated record set for `run` (empty for an
    /// unknown run id).
    #[must_use]
    pub fn records(&self, run: &str) -> Vec<ProductRecord> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces the accumulated record set for `run`.
    pub fn replace(&self, run: &str, records: Vec<ProductRecord>) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run.to_owned(), records);
    }
}
