// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core Scope implementation.

use std::cell::RefCell;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::mapped::MappedEntries;
use crate::spinlock::Spinlock;
use crate::store::StoreError;

static SCOPE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a scope.
///
/// Used with [`Scope::pop`] to unwind the current thread back past a given scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct ScopeInner {
    parent: Option<Scope>,
    scope_id: u64,
    label: Option<String>,
    values: Spinlock<MappedEntries>,
}

/// A node in a chain of diagnostic scopes.
///
/// A scope has an optional nested label and its own mapped values.  The labels of
/// a chain, read from the root down, form the nested diagnostic context; the
/// values, merged from the root down with inner scopes winning, form the mapped
/// diagnostic context.
///
/// # Examples
///
/// ```rust
/// use logscope::context::Scope;
///
/// let root = Scope::root();
/// let service = Scope::child(root, Some("OrdersService".to_string()));
/// service.set_value("tenant", "acme");
///
/// let method = Scope::child(service.clone(), Some("issue_refund".to_string()));
/// method.set_value("order", "42");
///
/// assert_eq!(method.labels(), ["OrdersService", "issue_refund"]);
/// assert_eq!(method.value("tenant").as_deref(), Some("acme"));
/// assert_eq!(method.nesting_level(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl Hash for Scope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

/// Indented by nesting level, then the id and the breadcrumb.
impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} ({})",
            "  ".repeat(self.nesting_level()),
            self.scope_id(),
            self.labels().join(" ")
        )
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

impl Scope {
    fn new(parent: Option<Scope>, label: Option<String>) -> Scope {
        Scope {
            inner: Arc::new(ScopeInner {
                parent,
                scope_id: SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                label,
                values: Spinlock::new(MappedEntries::new()),
            }),
        }
    }

    /// A new scope with no parent, no label and no values.
    pub fn root() -> Scope {
        Scope::new(None, None)
    }

    /// A new scope below `parent`.
    pub fn child(parent: Scope, label: Option<String>) -> Scope {
        Scope::new(Some(parent), label)
    }

    /// Returns the current scope for this thread.
    ///
    /// Every thread starts with its own empty root scope.
    ///
    /// # Panics
    ///
    /// Panics if called while the thread's locals are being destroyed.
    pub fn current() -> Scope {
        CURRENT.with(|cell| cell.borrow_mut().get_or_insert_with(Scope::root).clone())
    }

    /// Like [`current`](Self::current), for callers that must not panic.
    pub(crate) fn try_current() -> Result<Scope, StoreError> {
        CURRENT
            .try_with(|cell| {
                let mut current = cell.try_borrow_mut().map_err(|_| StoreError::Unavailable)?;
                Ok(current.get_or_insert_with(Scope::root).clone())
            })
            .map_err(|_| StoreError::Unavailable)?
    }

    pub(crate) fn try_set_current(self) -> Result<(), StoreError> {
        CURRENT
            .try_with(|cell| {
                let mut current = cell.try_borrow_mut().map_err(|_| StoreError::Unavailable)?;
                *current = Some(self);
                Ok(())
            })
            .map_err(|_| StoreError::Unavailable)?
    }

    /// Replaces this thread's chain with a fresh root.
    pub fn reset() {
        Scope::root().set_current();
    }

    /// Makes this scope the current one for this thread.
    pub fn set_current(self) {
        CURRENT.with(|cell| *cell.borrow_mut() = Some(self));
    }

    pub fn scope_id(&self) -> ScopeId {
        ScopeId(self.inner.scope_id)
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// This scope's own nested label, if it has one.
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// The number of ancestors.  A root has nesting level 0.
    pub fn nesting_level(&self) -> usize {
        let mut level = 0;
        let mut current = self;
        while let Some(parent) = &current.inner.parent {
            level += 1;
            current = parent;
        }
        level
    }

    /// Scopes from the root down to and including this one.
    fn chain(&self) -> Vec<&Scope> {
        let mut chain = Vec::with_capacity(self.nesting_level() + 1);
        let mut current = Some(self);
        while let Some(scope) = current {
            chain.push(scope);
            current = scope.parent();
        }
        chain.reverse();
        chain
    }

    /// Nested labels of the chain, outermost first.
    pub fn labels(&self) -> Vec<String> {
        self.chain()
            .into_iter()
            .filter_map(|s| s.inner.label.clone())
            .collect()
    }

    /// Sets a value on this scope only.
    pub fn set_value(&self, key: &str, value: &str) {
        self.inner.values.write(|values| {
            values.insert(key, value);
        });
    }

    /// Removes a value from this scope only.
    pub fn remove_value(&self, key: &str) -> Option<String> {
        self.inner.values.write(|values| values.remove(key))
    }

    pub(crate) fn has_own_value(&self, key: &str) -> bool {
        self.inner.values.read(|values| values.contains_key(key))
    }

    /// Looks `key` up from this scope outwards.
    pub fn value(&self, key: &str) -> Option<String> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(value) = scope.inner.values.read(|v| v.get(key).map(str::to_owned)) {
                return Some(value);
            }
            current = scope.parent();
        }
        None
    }

    /// The merged mapped context of the chain.
    ///
    /// Keys keep the position of their outermost occurrence and the value of their
    /// innermost one.
    pub fn values(&self) -> MappedEntries {
        let mut merged = MappedEntries::new();
        for scope in self.chain() {
            scope.inner.values.read(|values| {
                for (k, v) in values {
                    merged.insert(k, v);
                }
            });
        }
        merged
    }

    /// Unwinds the current thread to the parent of the scope with `id`.
    ///
    /// If `id` is not on the current chain, or names the root, nothing changes and
    /// a warning is logged.
    pub fn pop(id: ScopeId) {
        let mut current = Scope::current();
        loop {
            if current.scope_id() == id {
                match current.inner.parent.clone() {
                    Some(parent) => parent.set_current(),
                    None => tracing::warn!(%id, "refusing to pop the root scope"),
                }
                return;
            }
            match current.inner.parent.clone() {
                Some(parent) => current = parent,
                None => {
                    tracing::warn!(
                        %id,
                        "tried to pop a scope that is not on the current chain"
                    );
                    return;
                }
            }
        }
    }
}
