use alloc::{
    borrow::Cow,
    boxed::Box,
    sync::{Arc, Weak},
    vec,
    vec::Vec,
};
use core::fmt::{self, Debug, Formatter};
use tracing::{debug, error, info_span};

use crate::{
    any::Instance,
    base::{arguments, downcast, InjectorBase, Step},
    callable::{Arguments, Callable, Produced},
    config::Config,
    dependency_tree::DependencyNode,
    descriptor::Descriptor,
    errors::{InstantiateErrorKind, PendingWork, ResolveErrorKind},
    registry::{Registration, Registry},
    resolution_stack::ResolutionStack,
    resolver::Materialized,
    resource::{PendingResource, ScopedCapability},
    scope::InjectionScope,
    type_def::TypeDef,
};

#[cfg(feature = "async")]
use crate::async_impl;

/// Synchronous injector. Never suspends: async resolvers, hooks, generators and resources fail
/// with [`ResolveErrorKind::AsyncInSyncInjector`].
#[derive(Clone)]
pub struct Injector {
    pub(crate) inner: Arc<InjectorInner>,
    /// Absent on handles resolved from the injector's own frame.
    owner: Option<Arc<Owner>>,
}

impl Injector {
    /// Creates a root injector over a copy of `registry`.
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
            .insert_injector(Descriptor::of::<Injector>(), WeakInjector::Sync(Arc::downgrade(&inner)), false);
        inner
            .base
            .instances
            .insert_injector(Descriptor::of::<InjectorRef>(), WeakInjector::Sync(Arc::downgrade(&inner)), true);
        Self {
            owner: Some(Arc::new(Owner(inner.clone()))),
            inner,
        }
    }

    /// Handle given to services that depend on the injector. It doesn't keep the frame open.
    #[inline]
    pub(crate) fn from_frame(inner: Arc<InjectorInner>) -> Self {
        Self { inner, owner: None }
    }

    /// Creates a child injector with its own frame. Singletons are shared with this injector,
    /// scoped services are not.
    #[inline]
    #[must_use]
    pub fn get_scoped_injector(&self) -> Self {
        Self::from_base(self.inner.base.child(), self.inner.config, Some(self.clone()))
    }

    /// Runs `f` with a scoped injector and closes it afterwards, whatever `f` returned.
    ///
    /// # Errors
    /// Returns the error of `f`, otherwise the first teardown failure.
    pub fn scoped<F, R>(&self, f: F) -> Result<R, ResolveErrorKind>
    where
        F: FnOnce(&Injector) -> Result<R, ResolveErrorKind>,
    {
        let injector = self.get_scoped_injector();
        let result = f(&injector);
        let closed = injector.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Resolves `interface` with its transitive dependencies.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::ServiceNotFound`] if nothing is registered or cached for a descriptor in the graph
    /// - Returns [`ResolveErrorKind::ScopedServiceNotAvailable`] if a scoped service is resolved on the root injector
    /// - Returns [`ResolveErrorKind::CircularDependency`] if a callable is reentered within this resolution
    /// - Returns [`ResolveErrorKind::AsyncInSyncInjector`] if an async construct is met
    pub fn require(&self, interface: &Descriptor) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("require", interface = %interface);
        let _guard = span.enter();

        let result = self.inner.base.plan_require(interface).and_then(|node| {
            let mut stack = ResolutionStack::new();
            self.resolve_node(&node, &mut stack)
        });
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
    }

    /// Resolves the service registered for `T` itself.
    ///
    /// # Errors
    /// See [`Injector::require`]
    #[inline]
    pub fn require_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        self.require_typed(&Descriptor::of::<T>())
    }

    /// Resolves `interface` and downcasts the instance to `T`.
    ///
    /// # Errors
    /// See [`Injector::require`], plus [`ResolveErrorKind::IncorrectType`] if the instance isn't a `T`.
    pub fn require_typed<T: Send + Sync + 'static>(&self, interface: &Descriptor) -> Result<Arc<T>, ResolveErrorKind> {
        downcast(self.require(interface)?, interface)
    }

    /// Calls `callable` with its parameters resolved. The result isn't cached.
    ///
    /// # Errors
    /// See [`Injector::require`]
    #[inline]
    pub fn call(&self, callable: &Callable) -> Result<Instance, ResolveErrorKind> {
        self.call_with(callable, Vec::new(), None)
    }

    /// Calls `callable`, its leading parameters are taken from `positional_args` and its open
    /// variables are bound from `origin`.
    ///
    /// # Errors
    /// See [`Injector::require`]
    pub fn call_with(
        &self,
        callable: &Callable,
        positional_args: Vec<Instance>,
        origin: Option<Descriptor>,
    ) -> Result<Instance, ResolveErrorKind> {
        let span = info_span!("call", callable = callable.name());
        let _guard = span.enter();

        let mut stack = ResolutionStack::new();
        let result = self.call_in(callable, positional_args, origin, &mut stack);
        if let Err(err) = &result {
            error!("{}", err);
        }
        result
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

    /// Tears down the pending resources of this injector's frame in reverse order of opening.
    ///
    /// With [`Config::close_on_drop`] this also runs once the last handle created through
    /// [`Injector::new`] or [`Injector::get_scoped_injector`] (or a clone of it) is dropped.
    /// Handles injected into services don't count, so a cached service holding its injector
    /// doesn't keep the frame open.
    ///
    /// # Warning
    /// Async resources can't be closed here and are released unclosed.
    ///
    /// # Errors
    /// Returns the first teardown failure. The remaining resources are still closed.
    #[inline]
    pub fn close(&self) -> Result<(), InstantiateErrorKind> {
        self.inner.close()
    }
}

impl Injector {
    fn call_in(
        &self,
        callable: &Callable,
        positional_args: Vec<Instance>,
        origin: Option<Descriptor>,
        stack: &mut ResolutionStack,
    ) -> Result<Instance, ResolveErrorKind> {
        let node = self.inner.base.plan_call(callable, positional_args, origin)?;
        self.resolve_node(&node, stack)
    }

    fn resolve_node(&self, node: &DependencyNode, stack: &mut ResolutionStack) -> Result<Instance, ResolveErrorKind> {
        let injector = InjectorRef::Sync(self.clone());
        let (node, materialized) = match self.inner.base.prepare(&injector, node, stack)? {
            Step::Ready(instance) => return Ok(instance),
            Step::Resolve(node, materialized) => (node, materialized),
        };

        let result = self.invoke(&node, materialized, stack);
        stack.exit();
        let instance = result?;

        self.inner.base.place(&node, &instance)?;
        Ok(instance)
    }

    fn invoke(&self, node: &DependencyNode, materialized: Materialized, stack: &mut ResolutionStack) -> Result<Instance, ResolveErrorKind> {
        let mut args = Vec::with_capacity(node.args.len());
        for child in &node.args {
            args.push(self.resolve_node(child, stack)?);
        }
        let mut kwargs = Vec::with_capacity(node.kwargs.len());
        for (name, child) in &node.kwargs {
            kwargs.push((name.clone(), self.resolve_node(child, stack)?));
        }
        let arguments = arguments(node, args, kwargs);

        match materialized {
            Materialized::Construct(def) => self.construct(node, &def, arguments, stack),
            Materialized::Call(callable) => {
                let produced = callable.call(arguments)?;
                self.realize(node.scope, callable.name(), produced)
            }
            Materialized::Ready(instance) => Ok(instance),
        }
    }

    fn construct(&self, node: &DependencyNode, def: &Arc<TypeDef>, arguments: Arguments, stack: &mut ResolutionStack) -> Result<Instance, ResolveErrorKind> {
        let produced = def.instantiate(arguments)?;
        let instance = self.realize(node.scope, def.constructor().name(), produced)?;

        let origin = node.origin.clone().unwrap_or_else(|| def.descriptor().clone());
        for (hook, hook_origin) in def.post_inits(&origin) {
            debug!(hook = hook.name(), "Running post-init hook");
            self.call_in(&hook, vec![instance.clone()], Some(hook_origin), stack)?;
        }

        match def.scoped_capability(&instance) {
            Some(ScopedCapability::Sync(resource)) => {
                resource.enter()?;
                self.inner.base.retain(node.scope, PendingResource::Resource(resource));
                debug!("Resource entered");
            }
            Some(ScopedCapability::Async(resource)) => {
                return Err(ResolveErrorKind::AsyncInSyncInjector {
                    callable: Cow::Owned(def.constructor().name().into()),
                    pending: PendingWork::new(Box::pin(async move {
                        resource.enter().await?;
                        Ok(instance)
                    })),
                });
            }
            None => {}
        }
        Ok(instance)
    }

    fn realize(&self, scope: InjectionScope, name: &str, produced: Produced) -> Result<Instance, ResolveErrorKind> {
        match produced {
            Produced::Value(instance) => Ok(instance),
            Produced::Generator(mut generator) => {
                let instance = generator.start()?;
                self.inner.base.retain(scope, PendingResource::Generator(generator));
                debug!("Generator started");
                Ok(instance)
            }
            Produced::AsyncGenerator(generator) => Err(ResolveErrorKind::AsyncInSyncInjector {
                callable: Cow::Owned(name.into()),
                pending: PendingWork::from_generator(generator),
            }),
            Produced::Future(future) => Err(ResolveErrorKind::AsyncInSyncInjector {
                callable: Cow::Owned(name.into()),
                pending: PendingWork::new(future),
            }),
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
    /// Keeps the parent frame's owner, and so its teardown, alive while this injector is.
    #[allow(dead_code)]
    pub(crate) parent: Option<Injector>,
}

impl InjectorInner {
    fn close(&self) -> Result<(), InstantiateErrorKind> {
        let mut first_error = None;
        for resource in self.base.take_pending().into_iter().rev() {
            if let Err(err) = resource.close() {
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

/// Shared by the handles created through the public API, closes the frame when the last one goes.
struct Owner(Arc<InjectorInner>);

impl Drop for Owner {
    fn drop(&mut self) {
        let inner = &self.0;
        if !inner.config.close_on_drop || inner.base.instances.pending_len() == 0 {
            return;
        }
        // Failures are logged by `close`
        let _ = inner.close();
        debug!("Injector closed on drop");
    }
}

/// Injector a dependency can ask for without knowing its execution model.
#[derive(Clone, Debug)]
pub enum InjectorRef {
    Sync(Injector),
    #[cfg(feature = "async")]
    Async(async_impl::Injector),
}

impl InjectorRef {
    /// Recovers an injector from a resolved instance of `InjectorRef` or of a concrete injector.
    #[must_use]
    pub fn from_instance(instance: &Instance) -> Option<Self> {
        if let Some(injector) = instance.downcast_ref::<InjectorRef>() {
            return Some(injector.clone());
        }
        if let Some(injector) = instance.downcast_ref::<Injector>() {
            return Some(InjectorRef::Sync(injector.clone()));
        }
        #[cfg(feature = "async")]
        if let Some(injector) = instance.downcast_ref::<async_impl::Injector>() {
            return Some(InjectorRef::Async(injector.clone()));
        }
        None
    }

    #[inline]
    #[must_use]
    pub const fn is_async(&self) -> bool {
        match self {
            InjectorRef::Sync(_) => false,
            #[cfg(feature = "async")]
            InjectorRef::Async(_) => true,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_sync(&self) -> Option<&Injector> {
        match self {
            InjectorRef::Sync(injector) => Some(injector),
            #[cfg(feature = "async")]
            InjectorRef::Async(_) => None,
        }
    }

    #[cfg(feature = "async")]
    #[inline]
    #[must_use]
    pub fn as_async(&self) -> Option<&async_impl::Injector> {
        match self {
            InjectorRef::Sync(_) => None,
            InjectorRef::Async(injector) => Some(injector),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_registered(&self, interface: &Descriptor) -> bool {
        self.base().is_registered(interface)
    }

    #[inline]
    #[must_use]
    pub fn get_metadata(&self, interface: &Descriptor) -> Option<Arc<Registration>> {
        self.base().registry.get_metadata(interface).cloned()
    }

    pub(crate) fn base(&self) -> &InjectorBase {
        match self {
            InjectorRef::Sync(injector) => &injector.inner.base,
            #[cfg(feature = "async")]
            InjectorRef::Async(injector) => &injector.inner.base,
        }
    }

    /// Instance stored for a request of `InjectorRef` when `as_ref`, of the concrete injector otherwise.
    pub(crate) fn into_instance(self, as_ref: bool) -> Instance {
        if as_ref {
            return Arc::new(self);
        }
        match self {
            InjectorRef::Sync(injector) => Arc::new(injector),
            #[cfg(feature = "async")]
            InjectorRef::Async(injector) => Arc::new(injector),
        }
    }
}

/// Handle an injector keeps of itself in its own frame.
#[derive(Clone)]
pub(crate) enum WeakInjector {
    Sync(Weak<InjectorInner>),
    #[cfg(feature = "async")]
    Async(Weak<async_impl::injector::InjectorInner>),
}

impl WeakInjector {
    pub(crate) fn upgrade(&self) -> Option<InjectorRef> {
        match self {
            WeakInjector::Sync(inner) => inner.upgrade().map(|inner| InjectorRef::Sync(Injector::from_frame(inner))),
            #[cfg(feature = "async")]
            WeakInjector::Async(inner) => inner
                .upgrade()
                .map(|inner| InjectorRef::Async(async_impl::Injector::from_frame(inner))),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use alloc::{
        format,
        string::String,
        sync::Arc,
        vec::Vec,
    };
    use core::sync::atomic::{AtomicU8, Ordering};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    use super::{Injector, InjectorRef};
    use crate::{
        any::Instance,
        callable::{Callable, Parameter, Produced},
        config::Config,
        descriptor::Descriptor,
        errors::{InstantiateErrorKind, ResolveErrorKind},
        registry::{Provide, Registry},
        type_def::TypeDef,
    };

    struct Engine;
    struct Car(Arc<Engine>);
    struct Request;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .add_singleton(TypeDef::from_fn(|| Ok::<_, InstantiateErrorKind>(Engine)))
            .unwrap()
            .add_transient(TypeDef::from_fn(|engine: Arc<Engine>| Ok::<_, InstantiateErrorKind>(Car(engine))))
            .unwrap()
            .add_scoped(TypeDef::from_fn(|| Ok::<_, InstantiateErrorKind>(Request)))
            .unwrap();
        registry
    }

    #[test]
    #[traced_test]
    fn test_singleton_shared_with_scoped_injectors() {
        let injector = Injector::new(&registry());
        let scoped = injector.get_scoped_injector();

        let engine = injector.require_as::<Engine>().unwrap();
        let car = scoped.require_as::<Car>().unwrap();

        assert!(Arc::ptr_eq(&engine, &car.0));
        assert!(Arc::ptr_eq(&engine, &scoped.require_as::<Engine>().unwrap()));
    }

    #[test]
    #[traced_test]
    fn test_transient_distinct() {
        let injector = Injector::new(&registry());

        let first = injector.require_as::<Car>().unwrap();
        let second = injector.require_as::<Car>().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.0, &second.0));
    }

    #[test]
    #[traced_test]
    fn test_scoped_lifetimes() {
        let injector = Injector::new(&registry());

        let err = injector.require_as::<Request>().err().unwrap();
        assert!(matches!(err, ResolveErrorKind::ScopedServiceNotAvailable { .. }));
        assert_eq!(err.code(), "scoped_service.not_available");

        let first = injector.get_scoped_injector();
        let second = injector.get_scoped_injector();
        let request = first.require_as::<Request>().unwrap();

        assert!(Arc::ptr_eq(&request, &first.require_as::<Request>().unwrap()));
        assert!(!Arc::ptr_eq(&request, &second.require_as::<Request>().unwrap()));
        assert!(logs_contain("Cached"));
    }

    #[test]
    #[traced_test]
    fn test_requires_itself() {
        let injector = Injector::new(&registry());
        let scoped = injector.get_scoped_injector();

        let concrete = scoped.require_as::<Injector>().unwrap();
        assert!(concrete.ptr_eq(&scoped));

        let abstract_ref = scoped.require_as::<InjectorRef>().unwrap();
        assert!(abstract_ref.as_sync().unwrap().ptr_eq(&scoped));
        assert!(!abstract_ref.is_async());
        assert!(injector.require_as::<Injector>().unwrap().ptr_eq(&injector));
    }

    #[test]
    #[traced_test]
    fn test_call_with_positional_args() {
        let injector = Injector::new(&registry());
        let callable = Callable::new("describe", |arguments| {
            let label = arguments.get::<&'static str>(0)?;
            let _engine = arguments.get::<Engine>(1)?;
            Ok(Produced::value(format!("{label} with engine")))
        })
        .param(Parameter::untyped("label"))
        .param(Parameter::positional("engine", Descriptor::of::<Engine>()));

        let result = injector.call_with(&callable, Vec::from([Arc::new("car") as Instance]), None).unwrap();

        assert_eq!(*result.downcast::<String>().unwrap(), "car with engine");
    }

    #[test]
    #[traced_test]
    fn test_generator_closed_in_reverse_order() {
        struct First;
        struct Second;

        let closed = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry
            .add_scoped(Provide::resolver_as(
                Descriptor::of::<First>(),
                Callable::new("first", {
                    let closed = closed.clone();
                    move |_| {
                        let closed = closed.clone();
                        Ok(Produced::generator(move || {
                            Ok::<_, InstantiateErrorKind>((Arc::new(First), move || {
                                closed.lock().push("first");
                                Ok(())
                            }))
                        }))
                    }
                }),
            ))
            .unwrap()
            .add_scoped(Provide::resolver_as(
                Descriptor::of::<Second>(),
                Callable::new("second", {
                    let closed = closed.clone();
                    move |_| {
                        let closed = closed.clone();
                        Ok(Produced::generator(move || {
                            Ok::<_, InstantiateErrorKind>((Arc::new(Second), move || {
                                closed.lock().push("second");
                                Ok(())
                            }))
                        }))
                    }
                })
                .param(Parameter::positional("first", Descriptor::of::<First>())),
            ))
            .unwrap();

        let injector = Injector::new(&registry);
        injector
            .scoped(|scoped| {
                scoped.require_as::<Second>()?;
                assert!(closed.lock().is_empty());
                Ok(())
            })
            .unwrap();

        assert_eq!(*closed.lock(), ["second", "first"]);
    }

    #[test]
    #[traced_test]
    fn test_close_on_drop() {
        struct Connection;

        let closed = Arc::new(AtomicU8::new(0));
        let mut registry = Registry::new();
        registry
            .add_singleton(Provide::resolver_as(
                Descriptor::of::<Connection>(),
                Callable::new("connect", {
                    let closed = closed.clone();
                    move |_| {
                        let closed = closed.clone();
                        Ok(Produced::generator(move || {
                            Ok::<_, InstantiateErrorKind>((Arc::new(Connection), move || {
                                closed.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            }))
                        }))
                    }
                }),
            ))
            .unwrap();

        let injector = Injector::new(&registry);
        injector.require_as::<Connection>().unwrap();
        drop(injector);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let injector = Injector::with_config(&registry, Config { close_on_drop: false });
        injector.require_as::<Connection>().unwrap();
        drop(injector);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_close_on_drop_with_cached_service_holding_injector() {
        struct Holder(Injector);
        struct Connection;

        let closed = Arc::new(AtomicU8::new(0));
        let mut registry = Registry::new();
        registry
            .add_scoped(TypeDef::from_fn(|injector: Arc<Injector>| {
                Ok::<_, InstantiateErrorKind>(Holder(Injector::clone(&injector)))
            }))
            .unwrap()
            .add_scoped(Provide::resolver_as(
                Descriptor::of::<Connection>(),
                Callable::new("connect", {
                    let closed = closed.clone();
                    move |_| {
                        let closed = closed.clone();
                        Ok(Produced::generator(move || {
                            Ok::<_, InstantiateErrorKind>((Arc::new(Connection), move || {
                                closed.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            }))
                        }))
                    }
                }),
            ))
            .unwrap();

        let injector = Injector::new(&registry);
        let scoped = injector.get_scoped_injector();
        let holder = scoped.require_as::<Holder>().unwrap();
        scoped.require_as::<Connection>().unwrap();
        assert!(holder.0.ptr_eq(&scoped));

        drop(holder);
        let copy = scoped.clone();
        drop(scoped);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        drop(copy);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Injector closed on drop"));
    }
}
