use alloc::{boxed::Box, sync::Arc, vec, vec::Vec};
use core::{
    fmt::{self, Debug, Formatter},
    future::Future,
};
use tracing::{debug, error, info_span, warn, Instrument as _};

use crate::{
    any::Instance,
    base::{arguments, downcast, InjectorBase, Step},
    callable::{Arguments, Callable, Produced},
    config::Config,
    dependency_tree::DependencyNode,
    descriptor::Descriptor,
    errors::{InstantiateErrorKind, ResolveErrorKind},
    injector::{InjectorRef, WeakInjector},
    registry::{Registration, Registry},
    resolution_stack::ResolutionStack,
    resolver::Materialized,
    resource::{PendingResource, ScopedCapability},
    scope::InjectionScope,
    type_def::TypeDef,
    utils::future::BoxFuture,
};

/// Asynchronous injector. Awaits async resolvers, hooks, generators and resources in place,
/// siblings are still resolved one after another.
#[derive(Clone)]
pub struct Injector {
    pub(crate) inner: Arc<InjectorInner>,
    owner: Option<Arc<Owner>>,
}

impl Injector {
    #[inline]
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        Self::with_config(registry, Config::default())
    }

    #[inline]
    #[must_use]
    pub fn with_config(registry: &Registry, config: Config) -> Self {
        Self::from_base(InjectorBase::new(registry), config, None)
    }

    fn from_base(base: InjectorBase, config: Config, parent: Option<Injector>) -> Self {
        let inner = Arc::new(InjectorInner { base, config, parent });
        inner
            .base
            .instances
            .insert_injector(Descriptor::of::<Injector>(), WeakInjector::Async(Arc::downgrade(&inner)), false);
        inner
            .base
            .instances
            .insert_injector(Descriptor::of::<InjectorRef>(), WeakInjector::Async(Arc::downgrade(&inner)), true);
        Self {
            owner: Some(Arc::new(Owner(inner.clone()))),
            inner,
        }
    }

    #[inline]
    pub(crate) fn from_frame(inner: Arc<InjectorInner>) -> Self {
        Self { inner, owner: None }
    }

    #[inline]
    #[must_use]
    pub fn get_scoped_injector(&self) -> Self {
        Self::from_base(self.inner.base.child(), self.inner.config, Some(self.clone()))
    }

    /// Runs `f` with a scoped injector and closes it afterwards, whatever `f` returned.
    ///
    /// # Errors
    /// Returns the error of `f`, otherwise the first teardown failure.
    pub async fn scoped<F, Fut, R>(&self, f: F) -> Result<R, ResolveErrorKind>
    where
        F: FnOnce(Injector) -> Fut,
        Fut: Future<Output = Result<R, ResolveErrorKind>>,
    {
        let injector = self.get_scoped_injector();
        let result = f(injector.clone()).await;
        let closed = injector.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    /// # Errors
    /// See [`crate::Injector::require`], except that async constructs are awaited.
    pub async fn require(&self, interface: &Descriptor) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("require", interface = %interface);
        async move {
            let result = match self.inner.base.plan_require(interface) {
                Ok(node) => {
                    let mut stack = ResolutionStack::new();
                    self.resolve_node(&node, &mut stack).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                error!("{}", err);
            }
            result
        }
        .instrument(span)
        .await
    }

    /// # Errors
    /// See [`Injector::require`]
    #[inline]
    pub async fn require_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.require_typed(&Descriptor::of::<T>()).await
    }

    /// # Errors
    /// See [`Injector::require`], plus [`ResolveErrorKind::IncorrectType`] if the instance isn't a `T`.
    pub async fn require_typed<T: Send + Sync + 'static>(&self, interface: &Descriptor) -> Result<Arc<T>, ResolveErrorKind> {
        downcast(self.require(interface).await?, interface)
    }

    /// # Errors
    /// See [`Injector::require`]
    #[inline]
    pub async fn call(&self, callable: &Callable) -> Result<Instance, ResolveErrorKind> {
        self.call_with(callable, Vec::new(), None).await
    }

    /// # Errors
    /// See [`Injector::require`]
    pub async fn call_with(
        &self,
        callable: &Callable,
        positional_args: Vec<Instance>,
        origin: Option<Descriptor>,
    ) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("call", callable = callable.name());
        async move {
            let mut stack = ResolutionStack::new();
            let result = self.call_in(callable, positional_args, origin, &mut stack).await;
            if let Err(err) = &result {
                error!("{}", err);
            }
            result
        }
        .instrument(span)
        .await
    }

    #[inline]
    #[must_use]
    pub fn is_registered(&self, interface: &Descriptor) -> bool {
        self.inner.base.is_registered(interface)
    }

    #[inline]
    #[must_use]
    pub fn get_metadata(&self, interface: &Descriptor) -> Option<Arc<Registration>> {
        self.inner.base.registry.get_metadata(interface).cloned()
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.base.instances.is_root()
    }

    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Injector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Tears down the pending resources of this injector's frame in reverse order of opening,
    /// awaiting async ones.
    ///
    /// # Errors
    /// Returns the first teardown failure. The remaining resources are still closed.
    pub async fn close(&self) -> Result<(), InstantiateErrorKind> {
        let mut first_error = None;
        for resource in self.inner.base.take_pending().into_iter().rev() {
            if let Err(err) = resource.close_async().await {
                error!("{}", err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Injector {
    async fn call_in(
        &self,
        callable: &Callable,
        positional_args: Vec<Instance>,
        origin: Option<Descriptor>,
        stack: &mut ResolutionStack,
    ) -> Result<Instance, ResolveErrorKind> {
        let node = self.inner.base.plan_call(callable, positional_args, origin)?;
        self.resolve_node(&node, stack).await
    }

    fn resolve_node<'a>(
        &'a self,
        node: &'a DependencyNode,
        stack: &'a mut ResolutionStack,
    ) -> BoxFuture<'a, Result<Instance, ResolveErrorKind>> {
        Box::pin(async move {
            let injector = InjectorRef::Async(self.clone());
            let (node, materialized) = match self.inner.base.prepare(&injector, node, stack)? {
                Step::Ready(instance) => return Ok(instance),
                Step::Resolve(node, materialized) => (node, materialized),
            };

            let result = self.invoke(&node, materialized, stack).await;
            stack.exit();
            let instance = result?;

            self.inner.base.place(&node, &instance)?;
            Ok(instance)
        })
    }

    async fn invoke(&self, node: &DependencyNode, materialized: Materialized, stack: &mut ResolutionStack) -> Result<Instance, ResolveErrorKind> {
        let mut args = Vec::with_capacity(node.args.len());
        for child in &node.args {
            args.push(self.resolve_node(child, stack).await?);
        }
        let mut kwargs = Vec::with_capacity(node.kwargs.len());
        for (name, child) in &node.kwargs {
            kwargs.push((name.clone(), self.resolve_node(child, stack).await?));
        }
        let arguments = arguments(node, args, kwargs);

        match materialized {
            Materialized::Construct(def) => self.construct(node, &def, arguments, stack).await,
            Materialized::Call(callable) => {
                let produced = callable.call(arguments)?;
                self.realize(node.scope, produced).await
            }
            Materialized::Ready(instance) => Ok(instance),
        }
    }

    async fn construct(
        &self,
        node: &DependencyNode,
        def: &Arc<TypeDef>,
        arguments: Arguments,
        stack: &mut ResolutionStack,
    ) -> Result<Instance, ResolveErrorKind> {
        let produced = def.instantiate(arguments)?;
        let instance = self.realize(node.scope, produced).await?;

        let origin = node.origin.clone().unwrap_or_else(|| def.descriptor().clone());
        for (hook, hook_origin) in def.post_inits(&origin) {
            debug!(hook = hook.name(), "Running post-init hook");
            self.call_in(&hook, vec![instance.clone()], Some(hook_origin), stack).await?;
        }

        match def.scoped_capability(&instance) {
            Some(ScopedCapability::Sync(resource)) => {
                resource.enter()?;
                self.inner.base.retain(node.scope, PendingResource::Resource(resource));
                debug!("Resource entered");
            }
            Some(ScopedCapability::Async(resource)) => {
                resource.enter().await?;
                self.inner.base.retain(node.scope, PendingResource::AsyncResource(resource));
                debug!("Async resource entered");
            }
            None => {}
        }
        Ok(instance)
    }

    async fn realize(&self, scope: InjectionScope, produced: Produced) -> Result<Instance, ResolveErrorKind> {
        match produced {
            Produced::Value(instance) => Ok(instance),
            Produced::Generator(mut generator) => {
                let instance = generator.start()?;
                self.inner.base.retain(scope, PendingResource::Generator(generator));
                debug!("Generator started");
                Ok(instance)
            }
            Produced::AsyncGenerator(mut generator) => {
                let instance = generator.start().await?;
                self.inner.base.retain(scope, PendingResource::AsyncGenerator(generator));
                debug!("Async generator started");
                Ok(instance)
            }
            Produced::Future(future) => Ok(future.await?),
        }
    }
}

impl Debug for Injector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("root", &self.is_root())
            .field("registrations", &self.inner.base.registry.len())
            .finish_non_exhaustive()
    }
}

pub(crate) struct InjectorInner {
    pub(crate) base: InjectorBase,
    pub(crate) config: Config,
    #[allow(dead_code)]
    pub(crate) parent: Option<Injector>,
}

/// Closes the frame when the last handle created through the public API is dropped.
struct Owner(Arc<InjectorInner>);

impl Drop for Owner {
    /// Only sync resources can be closed here.
    fn drop(&mut self) {
        if !self.0.config.close_on_drop {
            return;
        }
        let pending = self.0.base.take_pending();
        if pending.is_empty() {
            return;
        }
        if pending.iter().any(PendingResource::is_async) {
            warn!("Async injector dropped without `close`, async resources are released unclosed");
        }
        for resource in pending.into_iter().rev() {
            if let Err(err) = resource.close() {
                error!("{}", err);
            }
        }
        debug!("Injector closed on drop");
    }
}
