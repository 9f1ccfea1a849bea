//! Correlation Registry
//!
//! Point-lookup table from correlation id to the in-flight exchange's
//! collector. Owned by the relay rather than living in ambient global
//! state; the run loop and the dispatcher share it behind a lock.

use std::collections::HashMap;

use crate::collector::ResponseCollector;
use crate::error::{RelayError, Result};
use crate::protocol::CorrelationId;

/// In-flight exchanges keyed by correlation id.
///
/// Entries are registered at dispatch time and retired the instant their
/// collector reports completion or fails. The registry is never iterated
/// in normal operation.
#[derive(Default)]
pub struct ExchangeRegistry {
    entries: HashMap<CorrelationId, ResponseCollector>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        ExchangeRegistry {
            entries: HashMap::new(),
        }
    }

    /// Store a collector under a fresh id.
    ///
    /// [`RelayError::DuplicateId`] means the id generation guarantee was
    /// violated; callers treat it as a programming error.
    pub fn register(&mut self, id: CorrelationId, collector: ResponseCollector) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(RelayError::DuplicateId(id));
        }
        self.entries.insert(id, collector);
        Ok(())
    }

    /// Remove and return the collector for `id`.
    ///
    /// [`RelayError::UnknownId`] is the expected, non-fatal case for stray
    /// or duplicate messages: the caller logs and drops.
    pub fn take(&mut self, id: &CorrelationId) -> Result<ResponseCollector> {
        self.entries
            .remove(id)
            .ok_or_else(|| RelayError::UnknownId(id.clone()))
    }

    /// Borrow the collector for `id` while its exchange stays registered.
    pub fn get_mut(&mut self, id: &CorrelationId) -> Option<&mut ResponseCollector> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
