// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolved declarations of an intercepted call.
//!
//! The interceptor never inspects code.  Everything it needs is resolved ahead of
//! time into a [`CallMetadata`]: which labels the declaring type and the method
//! declare, and how each parameter is bound.  The `#[log_context]` attribute emits
//! one `static CallMetadata` per instrumented function; hosts that intercept calls
//! some other way can register metadata in a [`MetadataTable`] and resolve it by
//! [`MethodIdentity`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::extractor::ExtractorDescriptor;

/// Explicit labels of one declaration.  Empty means "use the element's own name".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Labels {
    Static(&'static [&'static str]),
    Owned(Vec<String>),
}

impl Labels {
    /// A declaration without explicit labels.
    pub const DEFAULT: Labels = Labels::Static(&[]);

    pub const fn new(labels: &'static [&'static str]) -> Self {
        Labels::Static(labels)
    }

    pub fn owned<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Labels::Owned(labels.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Labels::Static(labels) => labels.is_empty(),
            Labels::Owned(labels) => labels.is_empty(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Labels::Static(labels) => Box::new(labels.iter().copied()),
            Labels::Owned(labels) => Box::new(labels.iter().map(String::as_str)),
        }
    }
}

/// The labels that apply after defaulting: the explicit ones, or the element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveLabels<'a> {
    Explicit(&'a Labels),
    Default(&'a str),
}

impl<'a> EffectiveLabels<'a> {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match *self {
            EffectiveLabels::Explicit(labels) => labels.iter(),
            EffectiveLabels::Default(name) => Box::new(std::iter::once(name)),
        }
    }

    /// The last effective label, used as the mapped key of a labelled parameter.
    pub fn last(&self) -> &'a str {
        match *self {
            EffectiveLabels::Explicit(labels) => labels.iter().last().unwrap_or_default(),
            EffectiveLabels::Default(name) => name,
        }
    }
}

/// A named element (type or method) and its label declaration, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementMetadata {
    name: Cow<'static, str>,
    declaration: Option<Labels>,
}

impl ElementMetadata {
    pub const fn declared(name: &'static str, labels: Labels) -> Self {
        Self {
            name: Cow::Borrowed(name),
            declaration: Some(labels),
        }
    }

    pub const fn undeclared(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            declaration: None,
        }
    }

    pub fn new(name: impl Into<Cow<'static, str>>, declaration: Option<Labels>) -> Self {
        Self {
            name: name.into(),
            declaration,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaration(&self) -> Option<&Labels> {
        self.declaration.as_ref()
    }

    /// `None` when the element carries no declaration.
    pub fn effective_labels(&self) -> Option<EffectiveLabels<'_>> {
        let labels = self.declaration.as_ref()?;
        Some(if labels.is_empty() {
            EffectiveLabels::Default(&self.name)
        } else {
            EffectiveLabels::Explicit(labels)
        })
    }
}

/// A parameter bound to an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBinding {
    prefix: Option<Cow<'static, str>>,
    extractor: ExtractorDescriptor,
}

impl ExtractedBinding {
    pub const fn new(prefix: Option<&'static str>, extractor: ExtractorDescriptor) -> Self {
        let prefix = match prefix {
            Some(prefix) => Some(Cow::Borrowed(prefix)),
            None => None,
        };
        Self { prefix, extractor }
    }

    pub fn with_prefix(prefix: impl Into<Cow<'static, str>>, extractor: ExtractorDescriptor) -> Self {
        Self {
            prefix: Some(prefix.into()),
            extractor,
        }
    }

    /// The declared prefix, unless it is blank.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.trim().is_empty())
    }

    pub fn extractor(&self) -> &ExtractorDescriptor {
        &self.extractor
    }
}

/// How one parameter contributes mapped context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterBinding {
    Unbound,
    /// The value is stringified under the last effective label.
    Labeled(Labels),
    Extracted(ExtractedBinding),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMetadata {
    name: Cow<'static, str>,
    binding: ParameterBinding,
}

impl ParameterMetadata {
    pub const fn new(name: &'static str, binding: ParameterBinding) -> Self {
        Self {
            name: Cow::Borrowed(name),
            binding,
        }
    }

    pub fn owned(name: impl Into<Cow<'static, str>>, binding: ParameterBinding) -> Self {
        Self {
            name: name.into(),
            binding,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> &ParameterBinding {
        &self.binding
    }

    /// The mapped key of a labelled parameter; `None` for other bindings.
    pub fn mapped_key(&self) -> Option<&str> {
        match &self.binding {
            ParameterBinding::Labeled(labels) if labels.is_empty() => Some(&self.name),
            ParameterBinding::Labeled(labels) => Some(EffectiveLabels::Explicit(labels).last()),
            _ => None,
        }
    }
}

/// What the interceptor can ask about a call.
pub trait CallMetadataProvider {
    fn declaring_type(&self) -> &ElementMetadata;

    fn method(&self) -> &ElementMetadata;

    /// Parameters in declaration order, receiver excluded.
    fn parameters(&self) -> &[ParameterMetadata];
}

/// Declarations of one call site, resolved ahead of interception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMetadata {
    declaring_type: ElementMetadata,
    method: ElementMetadata,
    parameters: Cow<'static, [ParameterMetadata]>,
}

impl CallMetadata {
    pub const fn new(
        declaring_type: ElementMetadata,
        method: ElementMetadata,
        parameters: &'static [ParameterMetadata],
    ) -> Self {
        Self {
            declaring_type,
            method,
            parameters: Cow::Borrowed(parameters),
        }
    }

    /// Starts metadata for a call registered at runtime.
    pub fn builder(
        type_name: impl Into<Cow<'static, str>>,
        method_name: impl Into<Cow<'static, str>>,
    ) -> CallMetadataBuilder {
        CallMetadataBuilder {
            declaring_type: ElementMetadata::new(type_name, None),
            method: ElementMetadata::new(method_name, None),
            parameters: Vec::new(),
        }
    }
}

impl CallMetadataProvider for CallMetadata {
    fn declaring_type(&self) -> &ElementMetadata {
        &self.declaring_type
    }

    fn method(&self) -> &ElementMetadata {
        &self.method
    }

    fn parameters(&self) -> &[ParameterMetadata] {
        &self.parameters
    }
}

/// Runtime construction of [`CallMetadata`].
///
/// ```
/// use logscope::metadata::{CallMetadata, CallMetadataProvider, Labels, ParameterBinding};
///
/// let metadata = CallMetadata::builder("OrdersService", "issue_refund")
///     .type_labels(Labels::DEFAULT)
///     .method_labels(Labels::owned(["refund"]))
///     .parameter("order_id", ParameterBinding::Labeled(Labels::owned(["order"])))
///     .parameter("reason", ParameterBinding::Unbound)
///     .build();
///
/// assert_eq!(metadata.parameters().len(), 2);
/// assert_eq!(metadata.parameters()[0].mapped_key(), Some("order"));
/// ```
#[derive(Debug, Clone)]
pub struct CallMetadataBuilder {
    declaring_type: ElementMetadata,
    method: ElementMetadata,
    parameters: Vec<ParameterMetadata>,
}

impl CallMetadataBuilder {
    pub fn type_labels(mut self, labels: Labels) -> Self {
        self.declaring_type.declaration = Some(labels);
        self
    }

    pub fn method_labels(mut self, labels: Labels) -> Self {
        self.method.declaration = Some(labels);
        self
    }

    pub fn parameter(mut self, name: impl Into<Cow<'static, str>>, binding: ParameterBinding) -> Self {
        self.parameters.push(ParameterMetadata::owned(name, binding));
        self
    }

    pub fn build(self) -> CallMetadata {
        CallMetadata {
            declaring_type: self.declaring_type,
            method: self.method,
            parameters: Cow::Owned(self.parameters),
        }
    }
}

/// Identifies a method: declaring type, method name and parameter type names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodIdentity {
    pub type_name: String,
    pub method_name: String,
    pub parameter_types: Vec<String>,
}

impl MethodIdentity {
    pub fn new<I, S>(type_name: impl Into<String>, method_name: impl Into<String>, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            parameter_types: parameter_types.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for MethodIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.type_name,
            self.method_name,
            self.parameter_types.join(", ")
        )
    }
}

/// An explicit registration table from method identity to call metadata.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    entries: HashMap<MethodIdentity, CallMetadata>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers metadata, returning what was registered for `identity` before.
    pub fn register(&mut self, identity: MethodIdentity, metadata: CallMetadata) -> Option<CallMetadata> {
        self.entries.insert(identity, metadata)
    }

    /// `None` when the identity was never registered: the call is not intercepted.
    pub fn resolve(&self, identity: &MethodIdentity) -> Option<&CallMetadata> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
