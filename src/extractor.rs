// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning argument values into mapped context.
//!
//! A parameter bound with `#[extracted_context(extractor = ...)]` contributes
//! whatever its [`ContextExtractor`] returns for the runtime value.  Extractors are
//! described by an [`ExtractorDescriptor`]: a name, a type identity and a factory
//! function.  The [`ExtractorCache`] instantiates each descriptor once; a factory
//! that fails or panics is replaced by [`NoOpExtractor`] so that the intercepted
//! call still runs.

use std::any::{Any, TypeId};
use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::mapped::MappedEntries;
use crate::spinlock::Spinlock;

/// Converts an argument value into mapped context entries.
///
/// `value` is `None` when the argument is absent; implementations must return an
/// empty mapping in that case, and likewise for values of a type they do not
/// understand.
///
/// ```
/// use std::any::Any;
/// use logscope::{ContextExtractor, MappedEntries};
///
/// struct Person {
///     name: String,
///     dob: String,
/// }
///
/// #[derive(Default)]
/// struct PersonExtractor;
///
/// impl ContextExtractor for PersonExtractor {
///     fn extract(&self, value: Option<&dyn Any>) -> MappedEntries {
///         let Some(person) = value.and_then(|v| v.downcast_ref::<Person>()) else {
///             return MappedEntries::new();
///         };
///         [("name", person.name.as_str()), ("dob", person.dob.as_str())]
///             .into_iter()
///             .collect()
///     }
/// }
///
/// let john = Person { name: "John".into(), dob: "20010821".into() };
/// let extracted = PersonExtractor.extract(Some(&john));
/// assert_eq!(extracted.get("name"), Some("John"));
/// assert!(PersonExtractor.extract(None).is_empty());
/// ```
pub trait ContextExtractor: Send + Sync {
    fn extract(&self, value: Option<&dyn Any>) -> MappedEntries;
}

/// Extracts nothing from anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NoOpExtractor;

impl ContextExtractor for NoOpExtractor {
    fn extract(&self, _value: Option<&dyn Any>) -> MappedEntries {
        MappedEntries::new()
    }
}

/// Why an extractor could not be instantiated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ExtractorError {
    #[error("extractor {name} failed to instantiate: {reason}")]
    Instantiation { name: &'static str, reason: String },
    #[error("extractor {name} panicked while instantiating")]
    Panicked { name: &'static str },
}

/// Creates a fresh extractor instance.
pub type ExtractorFactory = fn() -> Result<Box<dyn ContextExtractor>, ExtractorError>;

fn instantiate_default<E>() -> Result<Box<dyn ContextExtractor>, ExtractorError>
where
    E: ContextExtractor + Default + 'static,
{
    Ok(Box::new(E::default()))
}

/// Names an extractor and knows how to make one.
///
/// Descriptors are plain data and can live in `static` call metadata.
#[derive(Clone, Copy)]
pub struct ExtractorDescriptor {
    name: &'static str,
    type_id: fn() -> TypeId,
    factory: ExtractorFactory,
}

impl ExtractorDescriptor {
    /// Describes an extractor built with `E::default()`.
    pub const fn of<E>(name: &'static str) -> Self
    where
        E: ContextExtractor + Default + 'static,
    {
        Self {
            name,
            type_id: TypeId::of::<E>,
            factory: instantiate_default::<E>,
        }
    }

    /// Describes an extractor `E` built by a custom, possibly failing, factory.
    pub const fn from_factory<E>(name: &'static str, factory: ExtractorFactory) -> Self
    where
        E: ContextExtractor + 'static,
    {
        Self {
            name,
            type_id: TypeId::of::<E>,
            factory,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Identifies the extractor type together with the factory that builds it.
    fn key(&self) -> ExtractorKey {
        ExtractorKey {
            type_id: self.type_id(),
            factory: self.factory as usize,
        }
    }

    /// Runs the factory.  A panic inside it is reported as an error.
    pub fn instantiate(&self) -> Result<Box<dyn ContextExtractor>, ExtractorError> {
        let factory = self.factory;
        catch_unwind(AssertUnwindSafe(factory))
            .unwrap_or(Err(ExtractorError::Panicked { name: self.name }))
    }
}

impl Debug for ExtractorDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ExtractorDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ExtractorDescriptor {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExtractorKey {
    type_id: TypeId,
    factory: usize,
}

/// Resolves descriptors to shared instances, once per extractor type and factory.
///
/// Two descriptors for the same type but different factories resolve
/// independently.  A descriptor whose factory fails resolves to
/// [`NoOpExtractor`], and that fallback is cached too, so the failure is logged
/// once.
#[derive(Default)]
pub struct ExtractorCache {
    resolved: Spinlock<Vec<(ExtractorKey, Arc<dyn ContextExtractor>)>>,
}

impl ExtractorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, descriptor: &ExtractorDescriptor) -> Arc<dyn ContextExtractor> {
        let key = descriptor.key();
        if let Some(cached) = self.lookup(key) {
            return cached;
        }
        let instance: Arc<dyn ContextExtractor> = match descriptor.instantiate() {
            Ok(extractor) => Arc::from(extractor),
            Err(e) => {
                tracing::warn!(
                    extractor = descriptor.name(),
                    error = %e,
                    "falling back to the no-op extractor"
                );
                Arc::new(NoOpExtractor)
            }
        };
        self.resolved.write(|resolved| {
            // another thread may have resolved it meanwhile; first one wins
            match resolved.iter().find(|(k, _)| *k == key) {
                Some((_, existing)) => existing.clone(),
                None => {
                    resolved.push((key, instance.clone()));
                    instance
                }
            }
        })
    }

    fn lookup(&self, key: ExtractorKey) -> Option<Arc<dyn ContextExtractor>> {
        self.resolved.read(|resolved| {
            resolved
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, e)| e.clone())
        })
    }

    /// Number of descriptors resolved so far.
    pub fn len(&self) -> usize {
        self.resolved.read(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for ExtractorCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorCache")
            .field("resolved", &self.len())
            .finish()
    }
}
