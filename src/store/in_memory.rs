// SPDX-License-Identifier: MIT OR Apache-2.0

//! # In-Memory Store
//!
//! A [`DiagnosticStore`] that keeps its context in memory and records every
//! primitive operation it receives, in order.  It exists for testing code that
//! commits and reverses context units:
//!
//! - asserting the exact push/set order of a commit
//! - counting pops and removals after a reversal
//! - injecting failures into reversal actions
//!
//! Unlike [`ThreadLocalStore`](super::ThreadLocalStore) the recorded state is
//! shared by every thread holding the same `Arc<InMemoryStore>`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DiagnosticStore, StoreError};
use crate::mapped::MappedEntries;

/// One primitive operation, as observed by an [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreOp {
    PushLabel(String),
    PopLabel(String),
    SetValue(String, String),
    RemoveKey(String),
}

impl StoreOp {
    pub fn push(label: &str) -> Self {
        StoreOp::PushLabel(label.to_owned())
    }

    pub fn pop(label: &str) -> Self {
        StoreOp::PopLabel(label.to_owned())
    }

    pub fn set(key: &str, value: &str) -> Self {
        StoreOp::SetValue(key.to_owned(), value.to_owned())
    }

    pub fn remove(key: &str) -> Self {
        StoreOp::RemoveKey(key.to_owned())
    }
}

#[derive(Debug, Default)]
struct State {
    nested: Vec<String>,
    mapped: MappedEntries,
    operations: Vec<StoreOp>,
    failing_pops: usize,
    failing_removals: usize,
}

/// An ordered-call recording store.
///
/// ```
/// use logscope::store::{DiagnosticStore, InMemoryStore, StoreOp};
///
/// let store = InMemoryStore::new();
/// store.push_label("C1N").unwrap();
/// store.set_value("P1", "v").unwrap();
///
/// assert_eq!(
///     store.drain_operations(),
///     [StoreOp::push("C1N"), StoreOp::set("P1", "v")]
/// );
/// assert!(store.operations().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

// ============================================================================
// BOILERPLATE TRAIT IMPLEMENTATIONS
// ============================================================================
//
// - Debug/Default: derived, an empty store is the obvious zero value
// - Clone: NOT implemented, two handles on one recording should share an Arc
// - PartialEq/Eq/Hash: NOT implemented, equality of recordings is a test concern

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a panicking test thread must not hide the recording from the others
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every operation recorded so far, oldest first.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.state().operations.clone()
    }

    /// Returns the recorded operations and clears the recording.
    ///
    /// The nested stack and mapped context are left untouched.
    pub fn drain_operations(&self) -> Vec<StoreOp> {
        std::mem::take(&mut self.state().operations)
    }

    pub fn nested(&self) -> Vec<String> {
        self.state().nested.clone()
    }

    pub fn mapped(&self) -> MappedEntries {
        self.state().mapped.clone()
    }

    /// Counts recorded operations matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.state().operations.iter().filter(|op| predicate(op)).count()
    }

    /// Makes the next `n` calls to `pop_label` fail without touching the stack.
    pub fn fail_pops(&self, n: usize) {
        self.state().failing_pops = n;
    }

    /// Makes the next `n` calls to `remove_key` fail without touching the map.
    pub fn fail_removals(&self, n: usize) {
        self.state().failing_removals = n;
    }
}

impl DiagnosticStore for InMemoryStore {
    fn push_label(&self, label: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.nested.push(label.to_owned());
        state.operations.push(StoreOp::push(label));
        Ok(())
    }

    fn pop_label(&self) -> Result<String, StoreError> {
        let mut state = self.state();
        if state.failing_pops > 0 {
            state.failing_pops -= 1;
            return Err(StoreError::Backend("injected pop failure".to_owned()));
        }
        let label = state.nested.pop().ok_or(StoreError::EmptyStack)?;
        state.operations.push(StoreOp::pop(&label));
        Ok(label)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.mapped.insert(key, value);
        state.operations.push(StoreOp::set(key, value));
        Ok(())
    }

    fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing_removals > 0 {
            state.failing_removals -= 1;
            return Err(StoreError::Backend(format!(
                "injected removal failure for {key}"
            )));
        }
        state.mapped.remove(key);
        state.operations.push(StoreOp::remove(key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let store = InMemoryStore::new();
        store.push_label("a").unwrap();
        store.set_value("k", "v").unwrap();
        store.remove_key("k").unwrap();
        assert_eq!(store.pop_label().unwrap(), "a");

        assert_eq!(
            store.operations(),
            [
                StoreOp::push("a"),
                StoreOp::set("k", "v"),
                StoreOp::remove("k"),
                StoreOp::pop("a"),
            ]
        );
        assert!(store.nested().is_empty());
        assert!(store.mapped().is_empty());
    }

    #[test]
    fn injected_failures_leave_state_alone() {
        let store = InMemoryStore::new();
        store.push_label("a").unwrap();
        store.set_value("k", "v").unwrap();
        store.fail_pops(1);
        store.fail_removals(1);

        assert!(matches!(store.pop_label(), Err(StoreError::Backend(_))));
        assert!(matches!(store.remove_key("k"), Err(StoreError::Backend(_))));
        assert_eq!(store.nested(), ["a"]);
        assert_eq!(store.mapped().get("k"), Some("v"));

        // only the next n calls fail
        assert_eq!(store.pop_label().unwrap(), "a");
        store.remove_key("k").unwrap();
    }

    #[test]
    fn empty_pop() {
        let store = InMemoryStore::new();
        assert_eq!(store.pop_label(), Err(StoreError::EmptyStack));
        assert!(store.operations().is_empty());
    }
}
