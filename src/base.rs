use alloc::{borrow::Cow, sync::Arc, vec::Vec};
use core::any::type_name;
use tracing::debug;

use crate::{
    any::Instance,
    cache::InstancePool,
    callable::{Arguments, Callable},
    collection::CollectionKind,
    context::InjectionContext,
    dependency_tree::{shares_implementation, DependencyNode, DependencyTreeBuilder},
    descriptor::Descriptor,
    errors::ResolveErrorKind,
    injector::InjectorRef,
    registry::Registry,
    resolution_stack::ResolutionStack,
    resolver::{Materialized, RawTypeResolverFactory, ServiceResolver, WrappedTypeResolverFactory},
    resource::PendingResource,
    scope::InjectionScope,
};

/// Planning and placement shared by the sync and async injectors.
pub(crate) struct InjectorBase {
    pub(crate) registry: Arc<Registry>,
    pub(crate) instances: InstancePool,
}

/// Outcome of the checks run before a node's resolver is invoked.
pub(crate) enum Step<'a> {
    /// Instance known without invoking anything, nothing was pushed on the stack.
    Ready(Instance),
    /// The identity is on the stack, the caller must `exit` it.
    Resolve(Cow<'a, DependencyNode>, Materialized),
}

impl InjectorBase {
    /// Copies `registry` and adds the ambient raw-type, wrapped-type and collection registrations.
    #[must_use]
    pub(crate) fn new(registry: &Registry) -> Self {
        let mut registry = registry.copy();
        registry.provide_default(
            InjectionScope::Transient,
            Descriptor::raw_type(Descriptor::any()),
            ServiceResolver::Factory(Arc::new(RawTypeResolverFactory)),
        );
        registry.provide_default(
            InjectionScope::Transient,
            Descriptor::wrapped(Descriptor::any()),
            ServiceResolver::Factory(Arc::new(WrappedTypeResolverFactory)),
        );
        for kind in [CollectionKind::List, CollectionKind::Map] {
            registry.provide_default(
                InjectionScope::Transient,
                kind.descriptor(Descriptor::any()),
                ServiceResolver::Collection(kind),
            );
        }

        Self {
            registry: Arc::new(registry),
            instances: InstancePool::new(),
        }
    }

    /// Shares the registry, pushes a new frame.
    #[must_use]
    pub(crate) fn child(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            instances: self.instances.child(),
        }
    }

    pub(crate) fn plan_require(&self, interface: &Descriptor) -> Result<DependencyNode, ResolveErrorKind> {
        DependencyTreeBuilder::new(&self.registry, &self.instances).build_required(interface)
    }

    pub(crate) fn plan_call(
        &self,
        callable: &Callable,
        positional_args: Vec<Instance>,
        origin: Option<Descriptor>,
    ) -> Result<DependencyNode, ResolveErrorKind> {
        DependencyTreeBuilder::new(&self.registry, &self.instances).build_call(callable.clone(), positional_args, origin)
    }

    #[must_use]
    pub(crate) fn context_for(&self, injector: &InjectorRef, node: &DependencyNode) -> InjectionContext {
        InjectionContext::new(
            injector.clone(),
            node.origin.clone(),
            node.scope,
            node.required.clone(),
            node.positional_args.len(),
        )
    }

    /// Memoization, scope availability, materialization and cycle detection, in that order.
    pub(crate) fn prepare<'a>(
        &self,
        injector: &InjectorRef,
        node: &'a DependencyNode,
        stack: &mut ResolutionStack,
    ) -> Result<Step<'a>, ResolveErrorKind> {
        if let Some(required) = &node.required {
            if let Some(instance) = self.instances.get(required) {
                debug!(interface = %required, "Found in cache");
                return Ok(Step::Ready(instance));
            }
        }

        if node.scope == InjectionScope::Scoped && self.instances.is_root() {
            return Err(ResolveErrorKind::ScopedServiceNotAvailable {
                interface: interface_of(node),
            });
        }

        let materialized = node.resolver.materialize(&self.context_for(injector, node), &self.instances)?;
        let identity = match &materialized {
            Materialized::Ready(instance) => return Ok(Step::Ready(instance.clone())),
            Materialized::Construct(def) => def.constructor().clone(),
            Materialized::Call(callable) => callable.clone(),
        };
        stack.enter(&identity)?;

        if !node.deferred {
            return Ok(Step::Resolve(Cow::Borrowed(node), materialized));
        }
        match DependencyTreeBuilder::new(&self.registry, &self.instances).expand(node) {
            Ok(expanded) => Ok(Step::Resolve(Cow::Owned(expanded), materialized)),
            Err(err) => {
                stack.exit();
                Err(err)
            }
        }
    }

    /// Caches a realized instance according to the node's scope.
    pub(crate) fn place(&self, node: &DependencyNode, instance: &Instance) -> Result<(), ResolveErrorKind> {
        let root = match node.scope {
            InjectionScope::Immediate | InjectionScope::Transient => return Ok(()),
            InjectionScope::Singleton => true,
            InjectionScope::Scoped if self.instances.is_root() => {
                return Err(ResolveErrorKind::ScopedServiceNotAvailable {
                    interface: interface_of(node),
                })
            }
            InjectionScope::Scoped => false,
        };

        if let Some(required) = &node.required {
            self.instances.insert(required.clone(), instance.clone(), root);
        }
        if let (Some(registered), ServiceResolver::Default(def)) = (&node.registered, &node.resolver) {
            if node.required.as_ref() != Some(registered)
                && registered.is_concrete()
                && shares_implementation(&self.registry, registered, def, node.scope)
            {
                self.instances.insert(registered.clone(), instance.clone(), root);
            }
        }
        debug!(scope = %node.scope, "Cached");
        Ok(())
    }

    /// Pending resources of singletons live as long as the root frame.
    #[inline]
    pub(crate) fn retain(&self, scope: InjectionScope, resource: PendingResource) {
        self.instances.push_pending(resource, scope == InjectionScope::Singleton);
    }

    #[inline]
    #[must_use]
    pub(crate) fn take_pending(&self) -> Vec<PendingResource> {
        self.instances.take_pending()
    }

    #[inline]
    pub(crate) fn is_registered(&self, interface: &Descriptor) -> bool {
        self.instances.contains(interface) || self.registry.is_registered(interface)
    }
}

/// Pre-supplied positional arguments first, then the resolved ones.
pub(crate) fn arguments(node: &DependencyNode, args: Vec<Instance>, kwargs: Vec<(Cow<'static, str>, Instance)>) -> Arguments {
    let mut positional = node.positional_args.clone();
    positional.extend(args);
    Arguments::new(positional, kwargs)
}

pub(crate) fn downcast<T: Send + Sync + 'static>(instance: Instance, interface: &Descriptor) -> Result<Arc<T>, ResolveErrorKind> {
    instance.downcast::<T>().map_err(|_| ResolveErrorKind::IncorrectType {
        interface: interface.clone(),
        expected: type_name::<T>(),
    })
}

fn interface_of(node: &DependencyNode) -> Descriptor {
    node.required
        .clone()
        .or_else(|| node.registered.clone())
        .unwrap_or_else(Descriptor::any)
}
