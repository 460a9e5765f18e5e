// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interception engine.
//!
//! An [`Interceptor`] wraps one pending call at a time:
//!
//! 1. A call without resolved metadata is not eligible and runs untouched.
//! 2. A builder is obtained from the provider.
//! 3. Labels of the declaring type are pushed, then labels of the method.
//! 4. Parameters contribute mapped entries in declaration order, either as one
//!    labelled value or as everything their extractor returns.
//! 5. The builder is committed, the call runs, and the committed unit is reversed
//!    however the call ends.
//!
//! ```
//! use std::sync::Arc;
//! use logscope::metadata::{CallMetadata, ElementMetadata, Labels, ParameterBinding, ParameterMetadata};
//! use logscope::provider::StoreProvider;
//! use logscope::store::{InMemoryStore, StoreOp};
//! use logscope::{ArgValue, Interceptor, PendingCall};
//!
//! static REFUND_PARAMETERS: &[ParameterMetadata] =
//!     &[ParameterMetadata::new("order", ParameterBinding::Labeled(Labels::DEFAULT))];
//! static REFUND: CallMetadata = CallMetadata::new(
//!     ElementMetadata::declared("OrdersService", Labels::DEFAULT),
//!     ElementMetadata::declared("issue_refund", Labels::DEFAULT),
//!     REFUND_PARAMETERS,
//! );
//!
//! let store = Arc::new(InMemoryStore::new());
//! let interceptor = Interceptor::new(Arc::new(StoreProvider::new("memory", store.clone())));
//!
//! let order = 42;
//! let args = [ArgValue::display(&order)];
//! let depth = interceptor.invoke(&PendingCall::new(&REFUND, &args), || store.nested().len());
//!
//! assert_eq!(depth, 2);
//! assert_eq!(store.operations()[..3], [
//!     StoreOp::push("OrdersService"),
//!     StoreOp::push("issue_refund"),
//!     StoreOp::set("order", "42"),
//! ]);
//! assert!(store.nested().is_empty());
//! ```

use std::any::Any;
use std::fmt::{Debug, Display, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};

use crate::builder::ContextBuilder;
use crate::extractor::ExtractorCache;
use crate::mapped::MappedEntries;
use crate::metadata::{
    CallMetadataProvider, ExtractedBinding, MetadataTable, MethodIdentity, ParameterBinding,
    ParameterMetadata,
};
use crate::provider::{ContextProvider, lookup_provider};
use crate::unit::{ContextUnit, ReversalError, ReversalPolicy};

/// How a labelled parameter with no value is rendered.
pub const ABSENT_VALUE: &str = "null";

/// The runtime value of one argument, as the engine sees it.
#[derive(Clone, Copy, Default)]
pub enum ArgValue<'a> {
    #[default]
    Absent,
    /// Stringified for labelled parameters.
    Display(&'a dyn Display),
    /// Handed to extractors.  Only strings render as labelled values.
    Any(&'a dyn Any),
    /// Both: stringified when labelled, handed over when extracted.
    Value {
        any: &'a dyn Any,
        display: &'a dyn Display,
    },
}

impl<'a> ArgValue<'a> {
    pub fn display<T: Display>(value: &'a T) -> Self {
        ArgValue::Display(value)
    }

    pub fn any<T: Any>(value: &'a T) -> Self {
        ArgValue::Any(value)
    }

    pub fn value<T: Any + Display>(value: &'a T) -> Self {
        ArgValue::Value {
            any: value,
            display: value,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ArgValue::Absent)
    }

    /// The mapped value of a labelled parameter.
    ///
    /// An absent value renders as [`ABSENT_VALUE`].  A type-erased value that is
    /// not a `String` or `&str` has no textual form and renders as `None`; it is
    /// never mistaken for an absent one.
    pub fn render(&self) -> Option<String> {
        match self {
            ArgValue::Absent => Some(ABSENT_VALUE.to_owned()),
            ArgValue::Display(value) | ArgValue::Value { display: value, .. } => {
                Some(value.to_string())
            }
            ArgValue::Any(value) => {
                if let Some(s) = value.downcast_ref::<String>() {
                    Some(s.clone())
                } else {
                    value.downcast_ref::<&str>().map(|s| (*s).to_owned())
                }
            }
        }
    }

    /// The value handed to an extractor.
    pub fn as_any(&self) -> Option<&'a dyn Any> {
        match *self {
            ArgValue::Any(value) | ArgValue::Value { any: value, .. } => Some(value),
            ArgValue::Absent | ArgValue::Display(_) => None,
        }
    }
}

impl Debug for ArgValue<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::Absent => f.write_str("Absent"),
            ArgValue::Display(value) => f.debug_tuple("Display").field(&value.to_string()).finish(),
            ArgValue::Any(_) => f.write_str("Any(..)"),
            ArgValue::Value { display, .. } => {
                f.debug_tuple("Value").field(&display.to_string()).finish()
            }
        }
    }
}

/// A call about to happen: its resolved metadata, if any, and its arguments in
/// declaration order with the receiver excluded.
#[derive(Clone, Copy)]
pub struct PendingCall<'a> {
    metadata: Option<&'a dyn CallMetadataProvider>,
    args: &'a [ArgValue<'a>],
}

impl<'a> PendingCall<'a> {
    pub fn new(metadata: &'a dyn CallMetadataProvider, args: &'a [ArgValue<'a>]) -> Self {
        Self {
            metadata: Some(metadata),
            args,
        }
    }

    /// A call whose identity did not resolve to metadata.
    pub fn unresolved(args: &'a [ArgValue<'a>]) -> Self {
        Self {
            metadata: None,
            args,
        }
    }

    /// Looks `identity` up in `table`; an unregistered identity is unresolved.
    pub fn resolve(table: &'a MetadataTable, identity: &MethodIdentity, args: &'a [ArgValue<'a>]) -> Self {
        match table.resolve(identity) {
            Some(metadata) => Self::new(metadata, args),
            None => {
                tracing::trace!(%identity, "no metadata registered for call");
                Self::unresolved(args)
            }
        }
    }

    pub fn metadata(&self) -> Option<&'a dyn CallMetadataProvider> {
        self.metadata
    }

    pub fn args(&self) -> &'a [ArgValue<'a>] {
        self.args
    }

    fn arg(&self, index: usize) -> ArgValue<'a> {
        self.args.get(index).copied().unwrap_or_default()
    }
}

impl Debug for PendingCall<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("PendingCall");
        if let Some(metadata) = self.metadata {
            s.field("type", &metadata.declaring_type().name())
                .field("method", &metadata.method().name());
        }
        s.field("args", &self.args).finish()
    }
}

/// How a wrapped fallible call failed.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError<E> {
    /// The call's own failure, unchanged.
    #[error("{0}")]
    Call(E),
    /// The call succeeded but reversing its context did not.
    #[error(transparent)]
    Reversal(#[from] ReversalError),
}

impl<E> InterceptError<E> {
    /// The call's own failure, if that is what this is.
    pub fn into_call(self) -> Option<E> {
        match self {
            InterceptError::Call(e) => Some(e),
            InterceptError::Reversal(_) => None,
        }
    }
}

/// Wraps calls in their declared context.
pub struct Interceptor {
    provider: Arc<dyn ContextProvider>,
    extractors: ExtractorCache,
    policy: Option<ReversalPolicy>,
}

impl Interceptor {
    /// An interceptor using `provider` for every call.
    pub fn new(provider: Arc<dyn ContextProvider>) -> Self {
        Self {
            provider,
            extractors: ExtractorCache::new(),
            policy: None,
        }
    }

    /// An interceptor using the first registered provider.  Seals the registry.
    pub fn from_registry() -> Self {
        Self::new(lookup_provider())
    }

    /// The process-wide interceptor used by `#[log_context]`.
    ///
    /// Created from the registry on first use.
    pub fn global() -> &'static Interceptor {
        static GLOBAL: OnceLock<Interceptor> = OnceLock::new();
        GLOBAL.get_or_init(Interceptor::from_registry)
    }

    /// Overrides the provider's reversal policy for every unit this interceptor commits.
    pub fn with_policy(mut self, policy: ReversalPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn provider(&self) -> &Arc<dyn ContextProvider> {
        &self.provider
    }

    /// Accumulates and commits the call's context.
    ///
    /// `None` when the call is not eligible; nothing was done.  The returned unit
    /// reverses when dropped.
    pub fn enter(&self, call: &PendingCall<'_>) -> Option<ContextUnit> {
        let Some(metadata) = call.metadata() else {
            tracing::trace!("call has no metadata; running without context");
            return None;
        };
        let mut builder = self.provider.builder();
        if let Some(policy) = self.policy {
            builder.set_policy(policy);
        }
        self.accumulate(metadata, call, &mut builder);
        tracing::trace!(
            declaring_type = metadata.declaring_type().name(),
            method = metadata.method().name(),
            "committing call context"
        );
        Some(builder.build())
    }

    fn accumulate(
        &self,
        metadata: &dyn CallMetadataProvider,
        call: &PendingCall<'_>,
        builder: &mut ContextBuilder,
    ) {
        if let Some(labels) = metadata.declaring_type().effective_labels() {
            builder.add_nested(labels.iter());
        }
        if let Some(labels) = metadata.method().effective_labels() {
            builder.add_nested(labels.iter());
        }
        for (index, parameter) in metadata.parameters().iter().enumerate() {
            let value = call.arg(index);
            match parameter.binding() {
                ParameterBinding::Unbound => {}
                ParameterBinding::Labeled(_) => match value.render() {
                    Some(rendered) => {
                        builder.add_mapped(parameter.mapped_key(), rendered);
                    }
                    None => tracing::warn!(
                        parameter = parameter.name(),
                        "labelled value has no textual form; parameter contributes no context"
                    ),
                },
                ParameterBinding::Extracted(binding) => {
                    builder.add_mapped_all(self.extract(parameter, binding, value));
                }
            }
        }
    }

    fn extract(&self, parameter: &ParameterMetadata, binding: &ExtractedBinding, value: ArgValue<'_>) -> MappedEntries {
        let extractor = self.extractors.resolve(binding.extractor());
        let extracted = catch_unwind(AssertUnwindSafe(|| extractor.extract(value.as_any())))
            .unwrap_or_else(|_| {
                tracing::warn!(
                    parameter = parameter.name(),
                    extractor = binding.extractor().name(),
                    "extractor panicked; parameter contributes no context"
                );
                MappedEntries::new()
            });
        match binding.prefix() {
            Some(prefix) => extracted.with_prefix(prefix),
            None => extracted,
        }
    }

    /// Runs `call` inside the pending call's context.
    ///
    /// Reversal failures are logged; the call's result is returned unchanged.  A
    /// panic in `call` still reverses the context before it propagates.
    pub fn invoke<R>(&self, pending: &PendingCall<'_>, call: impl FnOnce() -> R) -> R {
        let unit = self.enter(pending);
        let result = call();
        if let Some(unit) = unit {
            if let Err(e) = unit.reverse() {
                tracing::warn!(error = %e, "failed to reverse call context");
            }
        }
        result
    }

    /// Runs a fallible `call` inside the pending call's context.
    ///
    /// A call failure is returned as [`InterceptError::Call`] even if reversal also
    /// failed.  After a successful call, a reversal failure is returned only when
    /// the unit's policy is [`ReversalPolicy::SurfaceLast`].
    pub fn proceed<T, E>(
        &self,
        pending: &PendingCall<'_>,
        call: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, InterceptError<E>> {
        let unit = self.enter(pending);
        let outcome = call();
        let reversal = unit.map_or(Ok(()), ContextUnit::reverse);
        match (outcome, reversal) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(InterceptError::Reversal(e)),
            (Err(e), Ok(())) => Err(InterceptError::Call(e)),
            (Err(e), Err(reversal)) => {
                tracing::warn!(error = %reversal, "failed to reverse context of a failed call");
                Err(InterceptError::Call(e))
            }
        }
    }
}

impl Debug for Interceptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("provider", &self.provider.name())
            .field("extractors", &self.extractors)
            .field("policy", &self.policy)
            .finish()
    }
}
