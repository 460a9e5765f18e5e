// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical, thread-local diagnostic scopes.
//!
//! This module is the second backing-store lineage.  Where
//! [`ThreadLocalStore`](crate::store::ThreadLocalStore) keeps a flat stack of
//! labels and one flat map of values, a [`Scope`] chain keeps one node per nested
//! label, and every node carries the mapped values that were set while it was
//! innermost.  Log formatters can then print each frame with its own values.
//!
//! # Overview
//!
//! - [`Scope`]: a node in the chain.  Cheap to clone (`Arc`-based).
//! - [`ScopeStore`]: a [`DiagnosticStore`](crate::store::DiagnosticStore) over the
//!   current thread's chain, usable by any builder.
//! - [`ApplyScope`]: a [`Future`] wrapper that installs a scope for every poll.
//!
//! # Thread-local scopes
//!
//! Each thread has a current scope.  Pushing a label creates a child of it and
//! makes the child current; popping makes the parent current again:
//!
//! ```rust
//! use logscope::context::Scope;
//!
//! Scope::reset();
//! let child = Scope::child(Scope::current(), Some("checkout".to_string()));
//! let id = child.scope_id();
//! child.set_current();
//! assert_eq!(Scope::current().labels(), ["checkout"]);
//!
//! Scope::pop(id);
//! assert!(Scope::current().labels().is_empty());
//! ```
//!
//! # Carrying a scope into async code
//!
//! The core never awaits, but the scope chain can be handed to a task that is
//! polled elsewhere:
//!
//! ```rust
//! use logscope::context::{ApplyScope, Scope};
//! # async fn handle_request() {}
//!
//! # async fn example() {
//! let scope = Scope::child(Scope::current(), Some("request".to_string()));
//! ApplyScope::new(scope, handle_request()).await;
//! # }
//! ```

mod apply_scope;
mod scope_impl;
mod scope_store;

#[cfg(test)]
mod tests;

pub use apply_scope::ApplyScope;
pub use scope_impl::{Scope, ScopeId};
pub use scope_store::ScopeStore;
