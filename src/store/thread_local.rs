// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat per-thread nested/mapped diagnostic context.

use std::cell::RefCell;

use super::{DiagnosticStore, StoreError};
use crate::mapped::MappedEntries;

#[derive(Debug)]
struct Diagnostics {
    nested: Vec<String>,
    mapped: MappedEntries,
}

thread_local! {
    static DIAGNOSTICS: RefCell<Diagnostics> = const {
        RefCell::new(Diagnostics {
            nested: Vec::new(),
            mapped: MappedEntries::new(),
        })
    };
}

/// Runs `f` against this thread's diagnostics.
///
/// Fails with [`StoreError::Unavailable`] when called during thread teardown or
/// reentrantly from inside another access.
fn with_diagnostics<R>(f: impl FnOnce(&mut Diagnostics) -> R) -> Result<R, StoreError> {
    DIAGNOSTICS
        .try_with(|cell| {
            let mut diagnostics = cell.try_borrow_mut().map_err(|_| StoreError::Unavailable)?;
            Ok(f(&mut diagnostics))
        })
        .map_err(|_| StoreError::Unavailable)?
}

/// A handle to the calling thread's nested stack and mapped context.
///
/// The handle itself carries no data; every thread sees its own diagnostics, so
/// concurrent requests on different threads never observe each other's entries.
///
/// ```
/// use logscope::store::{DiagnosticStore, ThreadLocalStore};
///
/// let store = ThreadLocalStore;
/// store.push_label("OrdersService").unwrap();
/// store.set_value("order", "42").unwrap();
/// assert_eq!(ThreadLocalStore::breadcrumb(), "OrdersService");
/// assert_eq!(ThreadLocalStore::value("order").as_deref(), Some("42"));
///
/// store.remove_key("order").unwrap();
/// assert_eq!(store.pop_label().unwrap(), "OrdersService");
/// assert_eq!(ThreadLocalStore::depth(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ThreadLocalStore;

impl ThreadLocalStore {
    /// The nested labels of this thread, outermost first.
    pub fn nested() -> Vec<String> {
        with_diagnostics(|d| d.nested.clone()).unwrap_or_default()
    }

    /// The mapped context of this thread.
    pub fn mapped() -> MappedEntries {
        with_diagnostics(|d| d.mapped.clone()).unwrap_or_default()
    }

    pub fn value(key: &str) -> Option<String> {
        with_diagnostics(|d| d.mapped.get(key).map(str::to_owned))
            .ok()
            .flatten()
    }

    pub fn depth() -> usize {
        with_diagnostics(|d| d.nested.len()).unwrap_or(0)
    }

    /// Nested labels joined by a single space, outermost first.
    pub fn breadcrumb() -> String {
        with_diagnostics(|d| d.nested.join(" ")).unwrap_or_default()
    }

    /// Discards everything this thread has accumulated.
    pub fn clear() {
        let _ = with_diagnostics(|d| {
            d.nested.clear();
            d.mapped.clear();
        });
    }
}

impl DiagnosticStore for ThreadLocalStore {
    fn push_label(&self, label: &str) -> Result<(), StoreError> {
        with_diagnostics(|d| d.nested.push(label.to_owned()))
    }

    fn pop_label(&self) -> Result<String, StoreError> {
        with_diagnostics(|d| d.nested.pop())?.ok_or(StoreError::EmptyStack)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        with_diagnostics(|d| {
            d.mapped.insert(key, value);
        })
    }

    fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        with_diagnostics(|d| {
            d.mapped.remove(key);
        })
    }
}
