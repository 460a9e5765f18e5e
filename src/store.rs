// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backing stores for the nested and mapped diagnostic context.
//!
//! logscope does not own a logging backend.  It only manages the lifecycle of
//! context entries, and it does so through the [`DiagnosticStore`] trait: two
//! primitive families, one for the nested (stack-like) context and one for the
//! mapped (key/value) context.
//!
//! Three stores ship with the crate:
//!
//! - [`ThreadLocalStore`]: a flat per-thread NDC stack and MDC map.  This is the
//!   store most log formatters read from.
//! - [`ScopeStore`](crate::context::ScopeStore): the hierarchical lineage, where
//!   every nested label becomes a child [`Scope`](crate::context::Scope).
//! - [`InMemoryStore`]: records every primitive operation in order.  Intended for
//!   tests.
//!
//! Stores are expected to isolate callers on their own (per thread, per task).
//! The core performs no locking of its own.

mod in_memory;
mod thread_local;

pub use in_memory::{InMemoryStore, StoreOp};
pub use thread_local::ThreadLocalStore;

use std::fmt::Debug;

/// Errors reported by a [`DiagnosticStore`] primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("nested context stack is empty")]
    EmptyStack,
    #[error("popped nested label {found:?}, expected {expected:?}")]
    UnexpectedLabel { expected: String, found: String },
    #[error("diagnostic context storage is unavailable on this thread")]
    Unavailable,
    #[error("{0}")]
    Backend(String),
}

/// The primitive operations of a diagnostic context backend.
///
/// Builders call `push_label` and `set_value` when a unit is committed; the
/// committed unit calls `pop_label` and `remove_key` when it is reversed.
/// `remove_key` is a best-effort remove: restoring a value that existed before
/// the commit is up to the store.
pub trait DiagnosticStore: Debug + Send + Sync {
    fn push_label(&self, label: &str) -> Result<(), StoreError>;

    /// Removes the innermost nested label and returns it.
    fn pop_label(&self) -> Result<String, StoreError>;

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove_key(&self, key: &str) -> Result<(), StoreError>;
}
