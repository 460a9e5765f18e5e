// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider lookup for [`ContextBuilder`]s.
//!
//! A [`ContextProvider`] hands out fresh builders over some backing store.  The
//! process-wide registry holds the providers installed by the application; the
//! first one registered is the one used.  With nothing registered, lookups yield
//! [`NoOpProvider`], whose builders never touch any store.
//!
//! The registry is meant to be configured early.  The first lookup seals it and
//! later registrations are refused with [`RegistryError::Sealed`].
//!
//! ```
//! use logscope::provider::{NoOpProvider, ContextProvider};
//!
//! let mut builder = NoOpProvider.builder();
//! builder.add_nested(["ignored"]).add_mapped("k", "v");
//! assert!(builder.is_no_op());
//! builder.build().reverse().unwrap();
//! ```
//!
//! Tests and embedders that do not want global state pass a provider directly to
//! [`Interceptor::new`](crate::Interceptor::new) instead.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::builder::ContextBuilder;
use crate::context::ScopeStore;
use crate::spinlock::Spinlock;
use crate::store::{DiagnosticStore, ThreadLocalStore};
use crate::unit::ReversalPolicy;

/// Supplies builders.
pub trait ContextProvider: Debug + Send + Sync {
    /// A fresh builder with nothing pending.
    fn builder(&self) -> ContextBuilder;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Builders over a fixed backing store.
#[derive(Debug, Clone)]
pub struct StoreProvider {
    name: String,
    store: Arc<dyn DiagnosticStore>,
    policy: ReversalPolicy,
}

impl StoreProvider {
    pub fn new(name: impl Into<String>, store: Arc<dyn DiagnosticStore>) -> Self {
        Self {
            name: name.into(),
            store,
            policy: ReversalPolicy::default(),
        }
    }

    /// The flat per-thread NDC/MDC store.
    pub fn thread_local() -> Self {
        Self::new("thread-local", Arc::new(ThreadLocalStore))
    }

    /// The hierarchical per-thread scope chain.
    pub fn scoped() -> Self {
        Self::new("scoped", Arc::new(ScopeStore))
    }

    pub fn with_policy(mut self, policy: ReversalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn DiagnosticStore> {
        &self.store
    }
}

impl ContextProvider for StoreProvider {
    fn builder(&self) -> ContextBuilder {
        ContextBuilder::new(self.store.clone()).with_policy(self.policy)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// The fallback when no provider is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoOpProvider;

impl ContextProvider for NoOpProvider {
    fn builder(&self) -> ContextBuilder {
        ContextBuilder::no_op()
    }

    fn name(&self) -> &str {
        "no-op"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    #[error("the provider registry is sealed; register providers before the first lookup")]
    Sealed,
}

struct Registry {
    providers: Spinlock<Vec<Arc<dyn ContextProvider>>>,
    sealed: AtomicBool,
}

static REGISTRY: Registry = Registry {
    providers: Spinlock::new(Vec::new()),
    sealed: AtomicBool::new(false),
};

/// Adds a provider to the process-wide registry.
///
/// Providers are consulted in registration order and only the first is used, so
/// registering a second provider has no effect on lookups.
pub fn register_provider(provider: Arc<dyn ContextProvider>) -> Result<(), RegistryError> {
    REGISTRY.providers.write(|providers| {
        // checked under the lock so a concurrent first lookup cannot miss this push
        if REGISTRY.sealed.load(Ordering::Acquire) {
            return Err(RegistryError::Sealed);
        }
        tracing::trace!(provider = provider.name(), "registering context provider");
        providers.push(provider);
        Ok(())
    })
}

/// The providers registered so far, in registration order.
pub fn registered_providers() -> Vec<Arc<dyn ContextProvider>> {
    REGISTRY.providers.read(|providers| providers.clone())
}

/// The first registered provider, or [`NoOpProvider`].  Seals the registry.
pub fn lookup_provider() -> Arc<dyn ContextProvider> {
    REGISTRY.providers.write(|providers| {
        if !REGISTRY.sealed.swap(true, Ordering::AcqRel) {
            tracing::trace!(registered = providers.len(), "sealing provider registry");
        }
        match providers.first() {
            Some(provider) => provider.clone(),
            None => Arc::new(NoOpProvider),
        }
    })
}

/// Whether a lookup already happened.
pub fn is_sealed() -> bool {
    REGISTRY.sealed.load(Ordering::Acquire)
}

/// A builder from the registered provider.
pub fn builder() -> ContextBuilder {
    lookup_provider().builder()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreOp};

    #[test]
    fn store_provider_builds_over_its_store() {
        let store = Arc::new(InMemoryStore::new());
        let provider = StoreProvider::new("memory", store.clone())
            .with_policy(ReversalPolicy::SurfaceLast);
        assert_eq!(provider.name(), "memory");

        let mut builder = provider.builder();
        assert_eq!(builder.policy(), ReversalPolicy::SurfaceLast);
        builder.add_nested(["a"]).add_mapped("k", "v");
        builder.build().reverse().unwrap();

        assert_eq!(
            store.operations(),
            [
                StoreOp::push("a"),
                StoreOp::set("k", "v"),
                StoreOp::remove("k"),
                StoreOp::pop("a"),
            ]
        );
    }

    #[test]
    fn each_builder_starts_empty() {
        let provider = StoreProvider::new("memory", Arc::new(InMemoryStore::new()));
        let mut first = provider.builder();
        first.add_nested(["a"]);
        assert!(provider.builder().nested().is_empty());
    }

    #[test]
    fn no_op_provider_touches_nothing() {
        let mut builder = NoOpProvider.builder();
        builder.add_nested(["a", "b"]).add_mapped("k", "v");
        assert!(builder.nested().is_empty());
        let unit = builder.build();
        assert!(unit.is_empty());
        assert_eq!(unit.reverse(), Ok(()));
    }

    // The global registry is exercised by the `registry` integration test, which
    // owns its process.
}
