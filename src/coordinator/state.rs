// ABOUTME: OperationSet - the three disjoint maps (pending, resolved, rejected).
// ABOUTME: Every mutator keeps each id in at most one map.

use std::collections::HashMap;

use serde_json::Value;

/// Aggregated results keyed by operation id.
pub type Results = HashMap<String, Value>;

/// Where an operation currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationState {
    /// Registered, outcome not yet known.
    Pending,
    /// Settled successfully with a coerced value.
    Resolved(Value),
    /// Settled with a coerced error.
    Rejected(Value),
}

/// A settled outcome ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Resolved(Value),
    Rejected(Value),
}

/// Pending, resolved and rejected operations.
///
/// `P` is whatever the owner keeps for a pending operation; the coordinator
/// stores its handles here, tests can use `()`.
#[derive(Debug)]
pub struct OperationSet<P> {
    pending: HashMap<String, P>,
    resolved: Results,
    rejected: Results,
}

impl<P> Default for OperationSet<P> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            resolved: HashMap::new(),
            rejected: HashMap::new(),
        }
    }
}

impl<P> OperationSet<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `id` into pending, evicting it from wherever it was.
    ///
    /// Returns the pending entry it replaced, if any.
    pub fn insert_pending(&mut self, id: impl Into<String>, entry: P) -> Option<P> {
        let id = id.into();
        self.resolved.remove(&id);
        self.rejected.remove(&id);
        self.pending.insert(id, entry)
    }

    /// Remove a pending entry without recording an outcome.
    pub fn remove_pending(&mut self, id: &str) -> Option<P> {
        self.pending.remove(id)
    }

    pub fn pending(&self, id: &str) -> Option<&P> {
        self.pending.get(id)
    }

    pub fn pending_mut(&mut self, id: &str) -> Option<&mut P> {
        self.pending.get_mut(id)
    }

    pub fn pending_entries_mut(&mut self) -> impl Iterator<Item = (&String, &mut P)> {
        self.pending.iter_mut()
    }

    /// Move a pending id into resolved or rejected.
    ///
    /// Returns the pending entry, or `None` (and records nothing) when the
    /// id was not pending.
    pub fn settle(&mut self, id: &str, outcome: Settled) -> Option<P> {
        let entry = self.pending.remove(id)?;
        match outcome {
            Settled::Resolved(value) => self.resolved.insert(id.to_string(), value),
            Settled::Rejected(value) => self.rejected.insert(id.to_string(), value),
        };
        Some(entry)
    }

    pub fn state(&self, id: &str) -> Option<OperationState> {
        if self.pending.contains_key(id) {
            Some(OperationState::Pending)
        } else if let Some(value) = self.resolved.get(id) {
            Some(OperationState::Resolved(value.clone()))
        } else {
            self.rejected
                .get(id)
                .map(|value| OperationState::Rejected(value.clone()))
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id) || self.resolved.contains_key(id) || self.rejected.contains_key(id)
    }

    /// Pending ids, sorted.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn resolved(&self) -> &Results {
        &self.resolved
    }

    pub fn rejected(&self) -> &Results {
        &self.rejected
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_resolved(&self) -> bool {
        !self.resolved.is_empty()
    }

    pub fn has_rejected(&self) -> bool {
        !self.rejected.is_empty()
    }

    /// Drop resolved results; all of them when `ids` is empty.
    pub fn clear_resolved(&mut self, ids: &[String]) {
        clear(&mut self.resolved, ids);
    }

    /// Drop rejected results; all of them when `ids` is empty.
    pub fn clear_rejected(&mut self, ids: &[String]) {
        clear(&mut self.rejected, ids);
    }
}

fn clear(results: &mut Results, ids: &[String]) {
    if ids.is_empty() {
        results.clear();
        return;
    }
    for id in ids {
        results.remove(id);
    }
}
