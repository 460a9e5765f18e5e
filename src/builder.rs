// SPDX-License-Identifier: MIT OR Apache-2.0

//! Accumulating context before it is committed.
//!
//! A [`ContextBuilder`] collects nested labels (ordered, duplicates allowed) and
//! mapped entries (ordered, last write wins per key).  Nothing reaches the backing
//! store until [`build`](ContextBuilder::build), which performs every push and set
//! at once and returns the [`ContextUnit`] that undoes them.
//!
//! Builders are normally obtained from a [`ContextProvider`](crate::ContextProvider),
//! either injected or looked up in the process-wide registry.  When no provider is
//! registered the lookup hands out [`ContextBuilder::no_op`], which accepts
//! everything and commits nothing.

use std::borrow::Cow;
use std::sync::Arc;

use crate::mapped::MappedEntries;
use crate::store::DiagnosticStore;
use crate::unit::{ContextUnit, ReversalAction, ReversalPolicy};

/// Text that may be absent.
///
/// Nested labels and mapped keys accept anything string-like.  `Option`s are
/// accepted too; `None` is the "null" input that accumulation quietly ignores.
pub trait IntoLabel {
    fn into_label(self) -> Option<String>;
}

impl IntoLabel for &str {
    fn into_label(self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl IntoLabel for String {
    fn into_label(self) -> Option<String> {
        Some(self)
    }
}

impl IntoLabel for &String {
    fn into_label(self) -> Option<String> {
        Some(self.clone())
    }
}

impl IntoLabel for Cow<'_, str> {
    fn into_label(self) -> Option<String> {
        Some(self.into_owned())
    }
}

impl<T: IntoLabel> IntoLabel for Option<T> {
    fn into_label(self) -> Option<String> {
        self.and_then(IntoLabel::into_label)
    }
}

/// Accumulates nested labels and mapped entries for one scope.
///
/// ```
/// use std::sync::Arc;
/// use logscope::ContextBuilder;
/// use logscope::store::{InMemoryStore, StoreOp};
///
/// let store = Arc::new(InMemoryStore::new());
/// let mut builder = ContextBuilder::new(store.clone());
/// builder
///     .add_nested(["OrdersService", "issue_refund"])
///     .add_mapped("order", "42");
///
/// let unit = builder.build();
/// assert_eq!(store.nested(), ["OrdersService", "issue_refund"]);
///
/// unit.reverse().unwrap();
/// assert!(store.nested().is_empty());
/// assert_eq!(store.operations().last(), Some(&StoreOp::pop("OrdersService")));
/// ```
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    /// `None` for the no-op builder
    store: Option<Arc<dyn DiagnosticStore>>,
    policy: ReversalPolicy,
    nested: Vec<String>,
    mapped: MappedEntries,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn DiagnosticStore>) -> Self {
        Self {
            store: Some(store),
            policy: ReversalPolicy::default(),
            nested: Vec::new(),
            mapped: MappedEntries::new(),
        }
    }

    /// A builder that ignores all input and commits units with nothing to reverse.
    pub fn no_op() -> Self {
        Self {
            store: None,
            policy: ReversalPolicy::default(),
            nested: Vec::new(),
            mapped: MappedEntries::new(),
        }
    }

    /// Sets the policy given to units built from here on.
    pub fn with_policy(mut self, policy: ReversalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_policy(&mut self, policy: ReversalPolicy) -> &mut Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ReversalPolicy {
        self.policy
    }

    pub fn is_no_op(&self) -> bool {
        self.store.is_none()
    }

    /// Appends labels to the pending nested context, in iteration order.
    ///
    /// `None` elements are skipped.  An empty batch is accepted and changes nothing.
    pub fn add_nested<I>(&mut self, labels: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: IntoLabel,
    {
        if self.is_no_op() {
            return self;
        }
        self.nested
            .extend(labels.into_iter().filter_map(IntoLabel::into_label));
        self
    }

    /// Sets one pending mapped entry.
    ///
    /// A missing key, or one that is blank after trimming, is ignored.  An existing
    /// key keeps its position and takes the new value.
    pub fn add_mapped(&mut self, key: impl IntoLabel, value: impl Into<String>) -> &mut Self {
        if self.is_no_op() {
            return self;
        }
        match key.into_label() {
            Some(key) if !key.trim().is_empty() => {
                self.mapped.insert(key, value);
            }
            _ => tracing::debug!("ignoring mapped context entry without a usable key"),
        }
        self
    }

    /// Applies [`add_mapped`](Self::add_mapped) to each entry, in iteration order.
    pub fn add_mapped_all<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: IntoLabel,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.add_mapped(key, value);
        }
        self
    }

    /// Pending nested labels, in push order.
    pub fn nested(&self) -> &[String] {
        &self.nested
    }

    /// Pending mapped entries, in insertion order.
    pub fn mapped(&self) -> &MappedEntries {
        &self.mapped
    }

    /// Commits the pending context to the backing store.
    ///
    /// Labels are pushed in order, then mapped entries are set in order.  The
    /// returned unit undoes exactly the operations that succeeded.
    ///
    /// The builder keeps its state, so building again pushes everything a second
    /// time and returns an independent unit.  Reverse the first unit before
    /// building again unless duplicated labels are what you want.
    pub fn build(&self) -> ContextUnit {
        let Some(store) = &self.store else {
            return ContextUnit::empty();
        };
        let mut recorded = Vec::with_capacity(self.nested.len() + self.mapped.len());
        for label in &self.nested {
            match store.push_label(label) {
                Ok(()) => recorded.push(ReversalAction::PopLabel(label.clone())),
                Err(e) => tracing::warn!(label = %label, error = %e, "failed to push nested context"),
            }
        }
        for (key, value) in &self.mapped {
            match store.set_value(key, value) {
                Ok(()) => recorded.push(ReversalAction::RemoveKey(key.to_owned())),
                Err(e) => tracing::warn!(key, error = %e, "failed to set mapped context"),
            }
        }
        tracing::trace!(
            nested = self.nested.len(),
            mapped = self.mapped.len(),
            "context unit committed"
        );
        ContextUnit::new(store.clone(), recorded, self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreOp};

    fn recording() -> (Arc<InMemoryStore>, ContextBuilder) {
        let store = Arc::new(InMemoryStore::new());
        let builder = ContextBuilder::new(store.clone());
        (store, builder)
    }

    #[test]
    fn nested_preserves_order_and_skips_none() {
        let (_, mut builder) = recording();
        builder.add_nested([Some("a"), None, Some("b")]);
        builder.add_nested(["c", "a"]);
        assert_eq!(builder.nested(), ["a", "b", "c", "a"]);
    }

    #[test]
    fn empty_nested_batch_is_accepted() {
        let (_, mut builder) = recording();
        builder.add_nested(Vec::<String>::new());
        assert!(builder.nested().is_empty());
    }

    #[test]
    fn mapped_last_write_wins() {
        let (_, mut builder) = recording();
        builder.add_mapped("k", "1").add_mapped("j", "x").add_mapped("k", "2");
        let entries: Vec<_> = builder.mapped().iter().collect();
        assert_eq!(entries, [("k", "2"), ("j", "x")]);
    }

    #[test]
    fn mapped_ignores_missing_and_blank_keys() {
        let (_, mut builder) = recording();
        builder.add_mapped(None::<&str>, "x");
        builder.add_mapped("", "x");
        builder.add_mapped("   ", "x");
        assert!(builder.mapped().is_empty());

        // surrounding whitespace is kept on a usable key
        builder.add_mapped(" k ", "x");
        assert_eq!(builder.mapped().get(" k "), Some("x"));
    }

    #[test]
    fn mapped_all_applies_in_order() {
        let (_, mut builder) = recording();
        builder.add_mapped_all([("a", "1"), (" ", "2"), ("a", "3"), ("b", "4")]);
        let entries: Vec<_> = builder.mapped().iter().collect();
        assert_eq!(entries, [("a", "3"), ("b", "4")]);
    }

    #[test]
    fn build_pushes_labels_then_sets_values() {
        let (store, mut builder) = recording();
        builder.add_mapped("k", "v").add_nested(["a", "b"]);
        let unit = builder.build();
        assert_eq!(
            store.drain_operations(),
            [StoreOp::push("a"), StoreOp::push("b"), StoreOp::set("k", "v")]
        );
        unit.reverse().unwrap();
        assert_eq!(
            store.drain_operations(),
            [StoreOp::remove("k"), StoreOp::pop("b"), StoreOp::pop("a")]
        );
    }

    #[test]
    fn build_twice_pushes_twice() {
        let (store, mut builder) = recording();
        builder.add_nested(["a"]);
        let first = builder.build();
        let second = builder.build();
        assert_eq!(store.nested(), ["a", "a"]);

        second.reverse().unwrap();
        assert_eq!(store.nested(), ["a"]);
        first.reverse().unwrap();
        assert!(store.nested().is_empty());
    }

    #[test]
    fn no_op_builder_does_nothing() {
        let mut builder = ContextBuilder::no_op();
        builder.add_nested(["a"]).add_mapped("k", "v");
        assert!(builder.nested().is_empty());
        assert!(builder.mapped().is_empty());
        let unit = builder.build();
        assert!(unit.is_empty());
        assert!(unit.reverse().is_ok());
    }

    #[test]
    fn policy_is_passed_to_units() {
        let (_, builder) = recording();
        let builder = builder.with_policy(ReversalPolicy::SurfaceLast);
        assert_eq!(builder.build().policy(), ReversalPolicy::SurfaceLast);
    }
}
