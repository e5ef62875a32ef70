use alloc::{sync::Arc, vec::Vec};
use core::fmt::{self, Debug, Display, Formatter};

use crate::{
    any::{Instance, TypeInfo},
    cache::InstancePool,
    callable::{Callable, Parameter, Produced},
    collection::CollectionKind,
    context::InjectionContext,
    descriptor::Descriptor,
    errors::ResolveErrorKind,
    type_def::TypeDef,
};

/// Resolution strategy that can only be chosen once the context is known.
///
/// The returned callable is invoked like any other resolver, its parameters are not resolved.
pub trait ResolverFactory: Send + Sync {
    /// # Errors
    /// Returns an error if the context doesn't allow to build a resolver.
    fn with_context(&self, context: &InjectionContext) -> Result<Callable, ResolveErrorKind>;
}

/// Raw type handed out for requests of [`Descriptor::raw_type`].
#[derive(Clone, PartialEq, Eq)]
pub struct TypeToken(Descriptor);

impl TypeToken {
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn type_info(&self) -> Option<TypeInfo> {
        self.0.type_info()
    }
}

impl Display for TypeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for TypeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TypeToken({})", self.0)
    }
}

fn requested_argument(context: &InjectionContext, fallback: fn(Descriptor) -> Descriptor) -> Result<Descriptor, ResolveErrorKind> {
    match context.required() {
        Some(required) => required.generic_params().first().cloned().ok_or_else(|| ResolveErrorKind::ServiceNotFound {
            interface: required.clone(),
        }),
        None => Err(ResolveErrorKind::ServiceNotFound {
            interface: fallback(Descriptor::any()),
        }),
    }
}

/// Answers `TypeToken[T]` with the token of `T`.
pub struct RawTypeResolverFactory;

impl ResolverFactory for RawTypeResolverFactory {
    fn with_context(&self, context: &InjectionContext) -> Result<Callable, ResolveErrorKind> {
        let descriptor = requested_argument(context, Descriptor::raw_type)?;
        Ok(Callable::new("raw_type", move |_| Ok(Produced::value(TypeToken(descriptor.clone())))))
    }
}

/// Answers `Descriptor[T]` with the descriptor of `T`.
pub struct WrappedTypeResolverFactory;

impl ResolverFactory for WrappedTypeResolverFactory {
    fn with_context(&self, context: &InjectionContext) -> Result<Callable, ResolveErrorKind> {
        let descriptor = requested_argument(context, Descriptor::wrapped)?;
        Ok(Callable::new("wrapped_type", move |_| Ok(Produced::value(descriptor.clone()))))
    }
}

#[derive(Clone)]
pub(crate) enum ServiceResolver {
    /// Constructs the implementation, runs its hooks and enters its resource.
    Default(Arc<TypeDef>),
    /// Calls the user callable, nothing implicit.
    Function(Callable),
    /// Returns an instance already present in the pool.
    Instantiated { implementation: Descriptor },
    Factory(Arc<dyn ResolverFactory>),
    /// Gathers every service assignable to the requested element, see [`crate::Services`].
    Collection(CollectionKind),
}

pub(crate) enum Materialized {
    Construct(Arc<TypeDef>),
    Call(Callable),
    Ready(Instance),
}

impl ServiceResolver {
    /// Callable whose parameters are resolved when the node is planned.
    #[inline]
    pub(crate) fn planned_callable(&self) -> Option<&Callable> {
        match self {
            ServiceResolver::Default(def) => Some(def.constructor()),
            ServiceResolver::Function(callable) => Some(callable),
            ServiceResolver::Instantiated { .. } | ServiceResolver::Factory(_) | ServiceResolver::Collection(_) => None,
        }
    }

    #[inline]
    pub(crate) fn signature(&self) -> &[Parameter] {
        self.planned_callable().map_or(&[], Callable::signature)
    }

    pub(crate) fn materialize(&self, context: &InjectionContext, instances: &InstancePool) -> Result<Materialized, ResolveErrorKind> {
        match self {
            ServiceResolver::Default(def) => Ok(Materialized::Construct(def.clone())),
            ServiceResolver::Function(callable) => Ok(Materialized::Call(callable.clone())),
            ServiceResolver::Instantiated { implementation } => instances
                .get(implementation)
                .map(Materialized::Ready)
                .ok_or_else(|| ResolveErrorKind::ServiceNotFound {
                    interface: implementation.clone(),
                }),
            ServiceResolver::Factory(factory) => factory.with_context(context).map(Materialized::Call),
            // Planning swaps a collection for its collector, an unplanned one has no members
            ServiceResolver::Collection(kind) => Ok(Materialized::Call(kind.collector(Vec::new()))),
        }
    }
}
