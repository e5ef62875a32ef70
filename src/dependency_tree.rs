use alloc::{borrow::Cow, sync::Arc, vec::Vec};
use tracing::debug;

use crate::{
    any::Instance,
    cache::InstancePool,
    callable::{Callable, ParamKind},
    collection::{members, CollectionKind},
    descriptor::Descriptor,
    errors::ResolveErrorKind,
    registry::Registry,
    resolver::ServiceResolver,
    scope::InjectionScope,
    type_def::TypeDef,
};

/// Planned resolution of one value. Immutable once built.
#[derive(Clone)]
pub(crate) struct DependencyNode {
    pub(crate) scope: InjectionScope,
    pub(crate) args: Vec<DependencyNode>,
    pub(crate) kwargs: Vec<(Cow<'static, str>, DependencyNode)>,
    pub(crate) resolver: ServiceResolver,
    /// Interface the value is requested as, `None` for direct calls and hooks.
    pub(crate) required: Option<Descriptor>,
    /// Specialized implementation the value is built as.
    pub(crate) registered: Option<Descriptor>,
    pub(crate) origin: Option<Descriptor>,
    pub(crate) positional_args: Vec<Instance>,
    /// Children weren't planned because the callable was already on the planning path.
    pub(crate) deferred: bool,
}

/// Registration chosen for a descriptor.
pub(crate) struct ServiceMetadata {
    pub(crate) scope: InjectionScope,
    pub(crate) resolver: ServiceResolver,
}

pub(crate) struct DependencyTreeBuilder<'a> {
    registry: &'a Registry,
    instances: &'a InstancePool,
    path: Vec<Callable>,
}

impl<'a> DependencyTreeBuilder<'a> {
    #[inline]
    #[must_use]
    pub(crate) fn new(registry: &'a Registry, instances: &'a InstancePool) -> Self {
        Self {
            registry,
            instances,
            path: Vec::new(),
        }
    }

    /// Known instance first, then the registration with the implementation already built,
    /// then the registration itself.
    pub(crate) fn service_metadata(&self, interface: &Descriptor) -> Result<ServiceMetadata, ResolveErrorKind> {
        if self.instances.contains(interface) {
            return Ok(ServiceMetadata {
                scope: InjectionScope::Immediate,
                resolver: ServiceResolver::Instantiated {
                    implementation: interface.clone(),
                },
            });
        }

        let Some(registration) = self.registry.get_metadata(interface) else {
            return Err(ResolveErrorKind::ServiceNotFound {
                interface: interface.clone(),
            });
        };

        if let ServiceResolver::Default(def) = &registration.resolver {
            let implementation = def.specialize(Some(interface));
            if implementation != *interface
                && implementation.is_concrete()
                && self.instances.contains(&implementation)
                && shares_implementation(self.registry, &implementation, def, registration.scope)
            {
                debug!(%interface, %implementation, "Implementation already built");
                return Ok(ServiceMetadata {
                    scope: InjectionScope::Immediate,
                    resolver: ServiceResolver::Instantiated { implementation },
                });
            }
        }

        Ok(ServiceMetadata {
            scope: registration.scope,
            resolver: registration.resolver.clone(),
        })
    }

    pub(crate) fn build_required(&mut self, interface: &Descriptor) -> Result<DependencyNode, ResolveErrorKind> {
        let ServiceMetadata { scope, resolver } = self.service_metadata(interface)?;
        self.build(scope, resolver, Some(interface.clone()), None, Vec::new())
    }

    pub(crate) fn build_call(
        &mut self,
        callable: Callable,
        positional_args: Vec<Instance>,
        origin: Option<Descriptor>,
    ) -> Result<DependencyNode, ResolveErrorKind> {
        self.build(
            InjectionScope::Immediate,
            ServiceResolver::Function(callable),
            None,
            origin,
            positional_args,
        )
    }

    /// Plans the children of a deferred node.
    pub(crate) fn expand(&mut self, node: &DependencyNode) -> Result<DependencyNode, ResolveErrorKind> {
        self.build(
            node.scope,
            node.resolver.clone(),
            node.required.clone(),
            node.origin.clone(),
            node.positional_args.clone(),
        )
    }

    fn build(
        &mut self,
        scope: InjectionScope,
        resolver: ServiceResolver,
        required: Option<Descriptor>,
        origin: Option<Descriptor>,
        positional_args: Vec<Instance>,
    ) -> Result<DependencyNode, ResolveErrorKind> {
        if let ServiceResolver::Collection(kind) = resolver {
            return self.build_collection(kind, scope, required);
        }

        let (origin, registered, hints) = match &resolver {
            ServiceResolver::Default(def) => {
                let specialized = def.specialize(required.as_ref());
                let bindings = def.constructor().bindings_for(Some(&specialized), None);
                let hints = def.constructor().get_signature_hints(&bindings);
                (Some(specialized.clone()), Some(specialized), hints)
            }
            ServiceResolver::Function(callable) => {
                let bindings = callable.bindings_for(origin.as_ref(), required.as_ref());
                let hints = callable.get_signature_hints(&bindings);
                (origin, None, hints)
            }
            ServiceResolver::Instantiated { .. } | ServiceResolver::Factory(_) | ServiceResolver::Collection(_) => {
                (origin, None, Vec::new())
            }
        };

        let mut node = DependencyNode {
            scope,
            args: Vec::new(),
            kwargs: Vec::new(),
            resolver,
            required,
            registered,
            origin,
            positional_args,
            deferred: false,
        };

        let Some(callable) = node.resolver.planned_callable().cloned() else {
            return Ok(node);
        };
        if self.path.iter().any(|planned| planned.ptr_eq(&callable)) {
            debug!(callable = callable.name(), "Already on the planning path, deferred");
            node.deferred = true;
            return Ok(node);
        }

        self.path.push(callable.clone());
        let result = self.build_children(&mut node, &callable, hints);
        self.path.pop();
        result.map(|()| node)
    }

    /// One child per member, each planned from its own registration, gathered by a collector.
    fn build_collection(&mut self, kind: CollectionKind, scope: InjectionScope, required: Option<Descriptor>) -> Result<DependencyNode, ResolveErrorKind> {
        let Some(element) = required.as_ref().and_then(|required| required.generic_params().first().cloned()) else {
            return Err(ResolveErrorKind::ServiceNotFound {
                interface: required.unwrap_or_else(|| kind.descriptor(Descriptor::any())),
            });
        };

        let members = members(self.registry, &element);
        debug!(%element, members = members.len(), "Collecting services");

        let mut args = Vec::with_capacity(members.len());
        let mut keys = Vec::with_capacity(members.len());
        for member in members {
            args.push(self.build(member.scope, member.resolver, Some(member.required), None, Vec::new())?);
            keys.push(member.key);
        }

        Ok(DependencyNode {
            scope,
            args,
            kwargs: Vec::new(),
            resolver: ServiceResolver::Function(kind.collector(keys)),
            required,
            registered: None,
            origin: None,
            positional_args: Vec::new(),
            deferred: false,
        })
    }

    fn build_children(&mut self, node: &mut DependencyNode, callable: &Callable, hints: Vec<Option<Descriptor>>) -> Result<(), ResolveErrorKind> {
        let supplied = node.positional_args.len();

        for (index, (param, hint)) in callable.signature().iter().zip(hints).enumerate() {
            if index < supplied && param.kind() != ParamKind::KeywordOnly {
                continue;
            }
            let Some(hint) = hint else {
                return Err(ResolveErrorKind::MissingTypeHint {
                    parameter: param.name().clone(),
                    callable: Cow::Owned(callable.name().into()),
                });
            };

            let ServiceMetadata { scope, resolver } = self.service_metadata(&hint)?;
            let child = self.build(scope, resolver, Some(hint), None, Vec::new())?;
            match param.kind() {
                ParamKind::KeywordOnly => node.kwargs.push((param.name().clone(), child)),
                ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => node.args.push(child),
            }
        }
        Ok(())
    }
}

/// Whether an instance built from `def` in `scope` may also stand for `implementation`: either
/// nothing is registered for it, or its registration builds the same type in the same scope.
pub(crate) fn shares_implementation(registry: &Registry, implementation: &Descriptor, def: &Arc<TypeDef>, scope: InjectionScope) -> bool {
    match registry.get_metadata(implementation) {
        None => true,
        Some(registration) => {
            registration.scope == scope && matches!(&registration.resolver, ServiceResolver::Default(other) if Arc::ptr_eq(other, def))
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec, vec::Vec};

    use super::DependencyTreeBuilder;
    use crate::{
        cache::InstancePool,
        callable::{Callable, Parameter, Produced},
        descriptor::Descriptor,
        errors::{InstantiateErrorKind, ResolveErrorKind},
        registry::Registry,
        resolver::ServiceResolver,
        scope::InjectionScope,
        type_def::TypeDef,
    };

    struct Engine;
    struct Wheel;
    struct Car;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .add_singleton(TypeDef::from_fn(|| Ok::<_, InstantiateErrorKind>(Engine)))
            .unwrap()
            .add_transient(TypeDef::from_fn(|| Ok::<_, InstantiateErrorKind>(Wheel)))
            .unwrap()
            .add_scoped(TypeDef::new(
                Descriptor::of::<Car>(),
                Callable::new("Car::new", |_| Ok(Produced::value(Car)))
                    .param(Parameter::positional_only("engine", Descriptor::of::<Engine>()))
                    .param(Parameter::keyword("wheel", Descriptor::of::<Wheel>())),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_positional_and_keyword_children() {
        let registry = registry();
        let instances = InstancePool::new();

        let node = DependencyTreeBuilder::new(&registry, &instances)
            .build_required(&Descriptor::of::<Car>())
            .unwrap();

        assert_eq!(node.scope, InjectionScope::Scoped);
        assert_eq!(node.args.len(), 1);
        assert_eq!(node.args[0].required, Some(Descriptor::of::<Engine>()));
        assert_eq!(node.args[0].scope, InjectionScope::Singleton);
        assert_eq!(node.kwargs.len(), 1);
        assert_eq!(node.kwargs[0].0, "wheel");
        assert_eq!(node.kwargs[0].1.scope, InjectionScope::Transient);
    }

    #[test]
    fn test_known_instance_short_circuits() {
        let registry = registry();
        let instances = InstancePool::new();
        instances.insert(Descriptor::of::<Engine>(), Arc::new(Engine), true);

        let node = DependencyTreeBuilder::new(&registry, &instances)
            .build_required(&Descriptor::of::<Car>())
            .unwrap();

        assert!(matches!(node.args[0].resolver, ServiceResolver::Instantiated { .. }));
    }

    #[test]
    fn test_supplied_positional_args_are_skipped() {
        let registry = Registry::new();
        let instances = InstancePool::new();
        let callable = Callable::new("hook", |_| Ok(Produced::value(())))
            .param(Parameter::untyped("self"))
            .param(Parameter::positional("engine", Descriptor::of::<Engine>()));

        let err = DependencyTreeBuilder::new(&registry, &instances)
            .build_call(callable.clone(), vec![Arc::new(Car)], None)
            .err()
            .unwrap();
        assert!(matches!(err, ResolveErrorKind::ServiceNotFound { .. }));

        let err = DependencyTreeBuilder::new(&registry, &instances)
            .build_call(callable, Vec::new(), None)
            .err()
            .unwrap();
        assert!(matches!(err, ResolveErrorKind::MissingTypeHint { .. }));
        assert_eq!(err.code(), "type_hint.missing");
    }

    #[test]
    fn test_cycle_is_deferred() {
        struct A;
        struct B;

        let mut registry = Registry::new();
        registry
            .add_singleton(TypeDef::from_fn(|_: Arc<B>| Ok::<_, InstantiateErrorKind>(A)))
            .unwrap()
            .add_singleton(TypeDef::from_fn(|_: Arc<A>| Ok::<_, InstantiateErrorKind>(B)))
            .unwrap();
        let instances = InstancePool::new();

        let node = DependencyTreeBuilder::new(&registry, &instances)
            .build_required(&Descriptor::of::<A>())
            .unwrap();

        assert!(!node.deferred);
        assert!(!node.args[0].deferred);
        assert!(node.args[0].args[0].deferred);
        assert!(node.args[0].args[0].args.is_empty());
    }
}
