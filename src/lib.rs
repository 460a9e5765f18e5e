//SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# logscope

logscope manages the lifecycle of logging context around a call.

# Development status

logscope is experimental and the API may change.

# The problem

Log lines are most useful when they say *where* they came from: which service, which
operation, which order.  The usual answer is a nested diagnostic context (a stack of
labels, printed as a breadcrumb) and a mapped diagnostic context (key/value fields),
both kept per thread by the logging backend.

Pushing onto those by hand is tedious and easy to get wrong.  Forget one pop on an
early return and every later log line on that thread carries a stale label.

# The approach

Context is *declared* on the code that owns it, and an interceptor commits it before
the call and reverses it afterwards, on every exit path:

```rust
use std::sync::Arc;
use logscope::log_context;
use logscope::provider::{StoreProvider, register_provider};
use logscope::store::ThreadLocalStore;

struct Orders;

#[log_context]
impl Orders {
    #[log_context("refund")]
    fn issue_refund(&self, #[log_context("order")] order_id: u64) -> String {
        format!("{} order={:?}", ThreadLocalStore::breadcrumb(), ThreadLocalStore::value("order"))
    }
}

register_provider(Arc::new(StoreProvider::thread_local())).unwrap();

assert_eq!(Orders.issue_refund(42), "Orders refund order=Some(\"42\")");
assert_eq!(ThreadLocalStore::depth(), 0);
assert_eq!(ThreadLocalStore::value("order"), None);
```

Type-level labels come first, then method-level labels, then one mapped entry per
annotated parameter in declaration order.  Parameters can also be handed to a
[`ContextExtractor`], which turns a value into several mapped entries.

# The pieces

* [`ContextBuilder`] accumulates nested labels and mapped entries and commits them as
  one [`ContextUnit`].
* [`ContextUnit`] undoes a commit, last pushed first.  What happens to reversal
  failures is the unit's [`ReversalPolicy`].
* [`store`] holds the [`DiagnosticStore`](store::DiagnosticStore) trait and the
  built-in stores.  [`context`] holds the hierarchical [`Scope`](context::Scope) chain.
* [`provider`] is the process-wide registry that hands out builders.  With nothing
  registered, everything degrades to no-ops.
* [`metadata`] describes what a call declares.  `#[log_context]` generates it; hosts
  that intercept calls some other way can register it in a
  [`MetadataTable`](metadata::MetadataTable).
* [`Interceptor`] runs the whole pipeline for one [`PendingCall`].

# Features

* `macros` (default): re-exports `#[log_context]` and `#[log_parameters]` from
  `logscope_proc`.

# Logging

logscope reports its own bookkeeping through [`tracing`](https://docs.rs/tracing):
`trace` for commits and reversals, `debug` for ignored input, `warn` for failures it
recovers from.  It never installs a subscriber.
*/

mod builder;
pub mod context;
mod engine;
mod extractor;
mod mapped;
pub mod metadata;
pub mod provider;
mod spinlock;
pub mod store;
mod unit;

pub use builder::{ContextBuilder, IntoLabel};
pub use engine::{ABSENT_VALUE, ArgValue, InterceptError, Interceptor, PendingCall};
pub use extractor::{
    ContextExtractor, ExtractorCache, ExtractorDescriptor, ExtractorError, ExtractorFactory,
    NoOpExtractor,
};
pub use mapped::MappedEntries;
pub use metadata::{CallMetadata, CallMetadataProvider};
pub use provider::{ContextProvider, RegistryError};
pub use unit::{ContextUnit, ReversalAction, ReversalError, ReversalPolicy};

#[cfg(feature = "macros")]
pub use logscope_proc::{log_context, log_parameters};

#[doc(hidden)]
pub mod hidden {
    use crate::engine::{ArgValue, Interceptor, PendingCall};
    use crate::metadata::CallMetadata;
    use crate::unit::ContextUnit;

    /// Entry point of code generated by `#[log_context]`.
    pub fn enter(call: &'static CallMetadata, args: &[ArgValue<'_>]) -> Option<ContextUnit> {
        Interceptor::global().enter(&PendingCall::new(call, args))
    }
}

extern crate self as logscope;
