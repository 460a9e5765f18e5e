// SPDX-License-Identifier: MIT OR Apache-2.0

//! Committed context units and their reversal.
//!
//! A [`ContextUnit`] is the reversible record of one commit: an ordered list of
//! reversal actions, one per nested label pushed and one per mapped entry set.
//! Reversal runs the actions last-recorded-first, so nested labels unwind in the
//! mirror image of their push order.
//!
//! Every action is attempted even when an earlier one fails.  What happens to the
//! failures is decided by the unit's [`ReversalPolicy`].

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::store::{DiagnosticStore, StoreError};

/// What a unit does with failed reversal actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReversalPolicy {
    /// Failures are logged and suppressed; reversal never fails.
    #[default]
    Swallow,
    /// All actions still run; if any failed, the last failure is returned.
    SurfaceLast,
}

/// One step of undoing a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReversalAction {
    /// Pop the innermost nested label, which must be this one.
    PopLabel(String),
    /// Remove a mapped key.
    RemoveKey(String),
}

impl ReversalAction {
    fn run(&self, store: &dyn DiagnosticStore) -> Result<(), StoreError> {
        match self {
            ReversalAction::PopLabel(expected) => {
                let found = store.pop_label()?;
                if &found != expected {
                    return Err(StoreError::UnexpectedLabel {
                        expected: expected.clone(),
                        found,
                    });
                }
                Ok(())
            }
            ReversalAction::RemoveKey(key) => store.remove_key(key),
        }
    }
}

impl Display for ReversalAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReversalAction::PopLabel(label) => write!(f, "pop {label:?}"),
            ReversalAction::RemoveKey(key) => write!(f, "remove {key:?}"),
        }
    }
}

/// Reversal failed for at least one action under [`ReversalPolicy::SurfaceLast`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{failures} of {attempted} reversal actions failed; last: {last}")]
pub struct ReversalError {
    pub failures: usize,
    pub attempted: usize,
    #[source]
    pub last: StoreError,
}

/// The reversible record of one commit.
///
/// A unit is reversed exactly once: either explicitly with [`reverse`](Self::reverse),
/// which consumes it, or implicitly when it is dropped.  Reversing twice cannot be
/// expressed.  Dropping reverses with [`ReversalPolicy::Swallow`] whatever the
/// unit's own policy, since `Drop` has nobody to report to.
#[must_use = "dropping a ContextUnit reverses it immediately"]
#[derive(Debug)]
pub struct ContextUnit {
    store: Option<Arc<dyn DiagnosticStore>>,
    /// in reversal order
    actions: Vec<ReversalAction>,
    policy: ReversalPolicy,
}

impl ContextUnit {
    /// Builds a unit from actions in the order they were recorded at commit time.
    pub(crate) fn new(
        store: Arc<dyn DiagnosticStore>,
        mut recorded: Vec<ReversalAction>,
        policy: ReversalPolicy,
    ) -> Self {
        recorded.reverse();
        Self {
            store: Some(store),
            actions: recorded,
            policy,
        }
    }

    /// A unit with nothing to undo.
    pub fn empty() -> Self {
        Self {
            store: None,
            actions: Vec::new(),
            policy: ReversalPolicy::Swallow,
        }
    }

    pub fn policy(&self) -> ReversalPolicy {
        self.policy
    }

    /// The pending reversal actions, in the order they will run.
    pub fn actions(&self) -> &[ReversalAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every reversal action.
    ///
    /// Under [`ReversalPolicy::Swallow`] this always returns `Ok`.  Under
    /// [`ReversalPolicy::SurfaceLast`] it returns the last failure after all
    /// actions have been attempted.
    pub fn reverse(mut self) -> Result<(), ReversalError> {
        let policy = self.policy;
        self.run(policy)
    }

    fn run(&mut self, policy: ReversalPolicy) -> Result<(), ReversalError> {
        let actions = std::mem::take(&mut self.actions);
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        let attempted = actions.len();
        let mut failures = 0;
        let mut last = None;
        for action in &actions {
            if let Err(e) = action.run(store.as_ref()) {
                tracing::warn!(%action, error = %e, "context reversal action failed");
                failures += 1;
                last = Some(e);
            }
        }
        tracing::trace!(attempted, failures, "context unit reversed");
        match (policy, last) {
            (ReversalPolicy::SurfaceLast, Some(last)) => Err(ReversalError {
                failures,
                attempted,
                last,
            }),
            _ => Ok(()),
        }
    }
}

impl Drop for ContextUnit {
    fn drop(&mut self) {
        let _ = self.run(ReversalPolicy::Swallow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreOp};

    fn committed(store: &Arc<InMemoryStore>, labels: &[&str], keys: &[&str]) -> Vec<ReversalAction> {
        let mut recorded = Vec::new();
        for label in labels {
            store.push_label(label).unwrap();
            recorded.push(ReversalAction::PopLabel(label.to_string()));
        }
        for key in keys {
            store.set_value(key, "v").unwrap();
            recorded.push(ReversalAction::RemoveKey(key.to_string()));
        }
        recorded
    }

    #[test]
    fn nested_labels_unwind_lifo() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a", "b", "c"], &[]);
        store.drain_operations();

        let unit = ContextUnit::new(store.clone(), recorded, ReversalPolicy::Swallow);
        unit.reverse().unwrap();
        assert_eq!(
            store.operations(),
            [StoreOp::pop("c"), StoreOp::pop("b"), StoreOp::pop("a")]
        );
    }

    #[test]
    fn mapped_keys_removed_before_labels() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a"], &["k1", "k2"]);
        store.drain_operations();

        ContextUnit::new(store.clone(), recorded, ReversalPolicy::Swallow)
            .reverse()
            .unwrap();
        assert_eq!(
            store.operations(),
            [StoreOp::remove("k2"), StoreOp::remove("k1"), StoreOp::pop("a")]
        );
    }

    #[test]
    fn swallow_attempts_everything() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a", "b"], &["k"]);
        store.drain_operations();
        store.fail_removals(1);
        store.fail_pops(1);

        let unit = ContextUnit::new(store.clone(), recorded, ReversalPolicy::Swallow);
        assert!(unit.reverse().is_ok());
        // the first pop failed, the second popped "b" where "a" was expected
        assert_eq!(store.operations(), [StoreOp::pop("b")]);
    }

    #[test]
    fn surface_last_reports_last_failure() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a"], &["k1", "k2"]);
        store.drain_operations();
        store.fail_removals(2);

        let unit = ContextUnit::new(store.clone(), recorded, ReversalPolicy::SurfaceLast);
        let err = unit.reverse().unwrap_err();
        assert_eq!(err.failures, 2);
        assert_eq!(err.attempted, 3);
        assert_eq!(
            err.last,
            StoreError::Backend("injected removal failure for k1".to_owned())
        );
        // the pop after both failures still ran
        assert_eq!(store.operations(), [StoreOp::pop("a")]);
    }

    #[test]
    fn unexpected_label_is_a_failure() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a"], &[]);
        store.push_label("intruder").unwrap();

        let unit = ContextUnit::new(store.clone(), recorded, ReversalPolicy::SurfaceLast);
        let err = unit.reverse().unwrap_err();
        assert_eq!(
            err.last,
            StoreError::UnexpectedLabel {
                expected: "a".to_owned(),
                found: "intruder".to_owned(),
            }
        );
    }

    #[test]
    fn drop_reverses_once() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a"], &["k"]);
        store.drain_operations();
        {
            let _unit = ContextUnit::new(store.clone(), recorded, ReversalPolicy::SurfaceLast);
        }
        assert_eq!(store.operations(), [StoreOp::remove("k"), StoreOp::pop("a")]);
    }

    #[test]
    fn explicit_reverse_does_not_run_again_on_drop() {
        let store = Arc::new(InMemoryStore::new());
        let recorded = committed(&store, &["a"], &[]);
        store.drain_operations();
        ContextUnit::new(store.clone(), recorded, ReversalPolicy::Swallow)
            .reverse()
            .unwrap();
        assert_eq!(store.count(|op| matches!(op, StoreOp::PopLabel(_))), 1);
    }

    #[test]
    fn empty_unit_reverses_cleanly() {
        assert!(ContextUnit::empty().reverse().is_ok());
        let store = Arc::new(InMemoryStore::new());
        let unit = ContextUnit::new(store.clone(), Vec::new(), ReversalPolicy::SurfaceLast);
        assert!(unit.is_empty());
        assert!(unit.reverse().is_ok());
        assert!(store.operations().is_empty());
    }
}
