// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`DiagnosticStore`] over the current thread's scope chain.

use super::scope_impl::Scope;
use crate::store::{DiagnosticStore, StoreError};

/// Stores context as [`Scope`] nodes on the calling thread.
///
/// - `push_label` creates a labelled child of the current scope and makes it current.
/// - `pop_label` makes the parent current again and returns the popped label.
/// - `set_value` writes to the current scope.
/// - `remove_key` removes the key from the innermost scope holding it.
///
/// ```
/// use logscope::context::{Scope, ScopeStore};
/// use logscope::store::DiagnosticStore;
///
/// Scope::reset();
/// let store = ScopeStore;
/// store.push_label("OrdersService").unwrap();
/// store.set_value("order", "42").unwrap();
/// assert_eq!(Scope::current().labels(), ["OrdersService"]);
/// assert_eq!(Scope::current().value("order").as_deref(), Some("42"));
///
/// store.remove_key("order").unwrap();
/// assert_eq!(store.pop_label().unwrap(), "OrdersService");
/// assert_eq!(Scope::current().nesting_level(), 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScopeStore;

impl DiagnosticStore for ScopeStore {
    fn push_label(&self, label: &str) -> Result<(), StoreError> {
        let current = Scope::try_current()?;
        Scope::child(current, Some(label.to_owned())).try_set_current()
    }

    fn pop_label(&self) -> Result<String, StoreError> {
        let current = Scope::try_current()?;
        let (Some(parent), Some(label)) = (current.parent(), current.label()) else {
            return Err(StoreError::EmptyStack);
        };
        let label = label.to_owned();
        parent.clone().try_set_current()?;
        Ok(label)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Scope::try_current()?.set_value(key, value);
        Ok(())
    }

    fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        let mut scope = Some(Scope::try_current()?);
        while let Some(current) = scope {
            if current.has_own_value(key) {
                current.remove_value(key);
                break;
            }
            scope = current.parent().cloned();
        }
        Ok(())
    }
}
