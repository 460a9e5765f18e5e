// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tests for the context module.

use std::sync::Arc;

use super::{ApplyScope, Scope, ScopeStore};
use crate::store::{DiagnosticStore, StoreError};
use crate::{ContextBuilder, ReversalPolicy};

#[test]
fn test_child_and_pop() {
    Scope::reset();
    let root = Scope::current();
    let child = Scope::child(root.clone(), Some("child".to_string()));
    let child_id = child.scope_id();
    child.set_current();

    let grandchild = Scope::child(Scope::current(), Some("grandchild".to_string()));
    grandchild.set_current();
    assert_eq!(Scope::current().labels(), ["child", "grandchild"]);

    // pops everything below the root
    Scope::pop(child_id);
    assert_eq!(Scope::current(), root);
}

#[test]
fn test_pop_unknown_id_is_ignored() {
    Scope::reset();
    let elsewhere = Scope::child(Scope::root(), Some("elsewhere".to_string()));
    let here = Scope::child(Scope::current(), Some("here".to_string()));
    here.clone().set_current();

    Scope::pop(elsewhere.scope_id());
    assert_eq!(Scope::current(), here);
}

#[test]
fn test_scope_equality() {
    let scope1 = Scope::root();
    let scope2 = scope1.clone();
    let scope3 = Scope::root();

    // same Arc pointer
    assert_eq!(scope1, scope2);
    assert_ne!(scope1, scope3);
}

#[test]
fn test_scope_hash() {
    use std::collections::HashMap;

    let scope1 = Scope::root();
    let scope2 = scope1.clone();
    let scope3 = Scope::root();

    let mut map = HashMap::new();
    map.insert(scope1.clone(), "value1");
    map.insert(scope3.clone(), "value3");

    assert_eq!(map.get(&scope2), Some(&"value1"));
    assert_eq!(map.get(&scope3), Some(&"value3"));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_scope_display() {
    let root = Scope::root();
    let root_display = root.to_string();
    assert_eq!(root_display, format!("{} ()", root.scope_id()));

    let child = Scope::child(root.clone(), Some("a".to_string()));
    let grandchild = Scope::child(child, Some("b".to_string()));
    let display = grandchild.to_string();

    // 2 spaces per nesting level
    assert!(display.starts_with("    #"));
    assert!(display.ends_with(" (a b)"));
}

#[test]
fn test_values_inner_scope_wins() {
    let root = Scope::root();
    root.set_value("tenant", "acme");
    root.set_value("request", "outer");

    let child = Scope::child(root.clone(), None);
    child.set_value("request", "inner");
    child.set_value("user", "alice");

    assert_eq!(child.value("request").as_deref(), Some("inner"));
    assert_eq!(root.value("request").as_deref(), Some("outer"));

    let merged: Vec<_> = child
        .values()
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    assert_eq!(merged, ["tenant=acme", "request=inner", "user=alice"]);
}

#[test]
fn test_store_remove_targets_innermost_holder() {
    Scope::reset();
    let store = ScopeStore;
    store.set_value("k", "outer").unwrap();
    store.push_label("a").unwrap();
    store.set_value("k", "inner").unwrap();
    store.push_label("b").unwrap();

    store.remove_key("k").unwrap();
    assert_eq!(Scope::current().value("k").as_deref(), Some("outer"));
    store.remove_key("k").unwrap();
    assert_eq!(Scope::current().value("k"), None);
}

#[test]
fn test_store_pop_root_is_empty_stack() {
    Scope::reset();
    assert_eq!(ScopeStore.pop_label(), Err(StoreError::EmptyStack));
}

#[test]
fn test_builder_over_scope_store() {
    Scope::reset();
    let mut builder =
        ContextBuilder::new(Arc::new(ScopeStore)).with_policy(ReversalPolicy::SurfaceLast);
    builder
        .add_nested(["OrdersService", "issue_refund"])
        .add_mapped("order", "42");

    let unit = builder.build();
    let current = Scope::current();
    assert_eq!(current.labels(), ["OrdersService", "issue_refund"]);
    assert_eq!(current.value("order").as_deref(), Some("42"));
    assert_eq!(current.nesting_level(), 2);

    unit.reverse().unwrap();
    let current = Scope::current();
    assert_eq!(current.nesting_level(), 0);
    assert_eq!(current.value("order"), None);
}

#[test_executors::async_test]
async fn test_apply_scope_installs_and_restores() {
    Scope::reset();
    let outside = Scope::current();
    let scope = Scope::child(Scope::root(), Some("job".to_string()));

    let labels = ApplyScope::new(scope, async { Scope::current().labels() }).await;
    assert_eq!(labels, ["job"]);
    assert_eq!(Scope::current(), outside);
}
