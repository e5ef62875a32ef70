use alloc::{borrow::Cow, format, sync::Arc, vec::Vec};
use core::fmt::{self, Debug, Formatter};

use crate::{
    any::Instance,
    callable::{Arguments, Callable, IntoAsyncCallable, IntoCallable, Parameter, Produced},
    descriptor::{Bindings, Descriptor},
    errors::InstantiateErrorKind,
    resource::{AsyncScopedResource, ScopedCapability, ScopedResource},
};

type SyncProbe = Arc<dyn Fn(&Instance) -> Option<Arc<dyn ScopedResource>> + Send + Sync>;
type AsyncProbe = Arc<dyn Fn(&Instance) -> Option<Arc<dyn AsyncScopedResource>> + Send + Sync>;

#[derive(Clone)]
enum ResourceProbe {
    Sync(SyncProbe),
    Async(AsyncProbe),
}

/// Described implementation type.
///
/// Holds the generic descriptor of the type, the constructor, the post-init hooks declared on
/// the type itself, its ancestors with the arguments passed to them and the scoped-resource
/// capability, if any.
#[derive(Clone)]
pub struct TypeDef {
    descriptor: Descriptor,
    constructor: Callable,
    hooks: Vec<Callable>,
    bases: Vec<(Arc<TypeDef>, Vec<Descriptor>)>,
    implements: Vec<Descriptor>,
    resource: Option<ResourceProbe>,
}

impl TypeDef {
    /// The constructor is owned by `descriptor` unless it already declares an owner.
    #[must_use]
    pub fn new(descriptor: Descriptor, constructor: Callable) -> Self {
        let constructor = if constructor.owner().is_some() {
            constructor
        } else {
            constructor.owned_by(descriptor.clone())
        };
        Self {
            descriptor,
            constructor,
            hooks: Vec::new(),
            bases: Vec::new(),
            implements: Vec::new(),
            resource: None,
        }
    }

    /// Type described by a constructor closure over `Arc`s, see [`Callable::from_fn`].
    #[must_use]
    pub fn from_fn<Args, F>(constructor: F) -> Self
    where
        F: IntoCallable<Args>,
    {
        let descriptor = Descriptor::of::<F::Provides>();
        let name: Cow<'static, str> = format!("{descriptor}::new").into();
        Self::new(descriptor, constructor.into_callable(name))
    }

    #[must_use]
    pub fn from_async_fn<Args, F>(constructor: F) -> Self
    where
        F: IntoAsyncCallable<Args>,
    {
        let descriptor = Descriptor::of::<F::Provides>();
        let name: Cow<'static, str> = format!("{descriptor}::new").into();
        Self::new(descriptor, constructor.into_callable(name))
    }

    /// Adds a hook run after construction. The new instance is passed as the first positional
    /// argument, so the hook's first parameter is never resolved.
    #[must_use]
    pub fn post_init(mut self, hook: Callable) -> Self {
        let hook = if hook.owner().is_some() {
            hook
        } else {
            hook.owned_by(self.descriptor.clone())
        };
        self.hooks.push(hook);
        self
    }

    /// Declares `base` as an ancestor. `args` are written in terms of this type's variables and
    /// fill the ancestor's variables in order.
    #[must_use]
    pub fn extends<I>(mut self, base: Arc<TypeDef>, args: I) -> Self
    where
        I: IntoIterator<Item = Descriptor>,
    {
        self.bases.push((base, args.into_iter().collect()));
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: Descriptor) -> Self {
        self.implements.push(interface);
        self
    }

    #[must_use]
    pub fn scoped_resource<T: ScopedResource + 'static>(mut self) -> Self {
        self.resource = Some(ResourceProbe::Sync(Arc::new(|instance: &Instance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|resource| resource as Arc<dyn ScopedResource>)
        })));
        self
    }

    #[must_use]
    pub fn async_scoped_resource<T: AsyncScopedResource + 'static>(mut self) -> Self {
        self.resource = Some(ResourceProbe::Async(Arc::new(|instance: &Instance| {
            instance
                .clone()
                .downcast::<T>()
                .ok()
                .map(|resource| resource as Arc<dyn AsyncScopedResource>)
        })));
        self
    }

    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    #[inline]
    #[must_use]
    pub fn constructor(&self) -> &Callable {
        &self.constructor
    }

    #[inline]
    #[must_use]
    pub fn signature(&self) -> &[Parameter] {
        self.constructor.signature()
    }

    /// # Errors
    /// Returns the failure raised by the constructor.
    #[inline]
    pub fn instantiate(&self, arguments: Arguments) -> Result<Produced, InstantiateErrorKind> {
        self.constructor.call(arguments)
    }

    /// The type and its ancestors, most-base first, each with its descriptor written in this
    /// type's variables. An ancestor reachable through several paths appears once.
    #[must_use]
    pub fn lineage(self: &Arc<Self>) -> Vec<(Arc<TypeDef>, Descriptor)> {
        let mut lineage = Vec::new();
        collect_lineage(self, self.descriptor.clone(), &mut lineage);
        lineage
    }

    #[must_use]
    pub fn is_assignable_to(self: &Arc<Self>, interface: &Descriptor) -> bool {
        self.lineage().iter().any(|(def, seen)| {
            seen.is_compatible(interface) || def.implemented_as(seen).iter().any(|implemented| implemented.is_compatible(interface))
        })
    }

    /// This type's descriptor specialized for a request of `required`, which may name the type
    /// itself, one of its ancestors or an implemented interface.
    #[must_use]
    pub fn specialize(self: &Arc<Self>, required: Option<&Descriptor>) -> Descriptor {
        let Some(required) = required else {
            return self.descriptor.clone();
        };
        let Some(required_base) = required.base() else {
            return self.descriptor.clone();
        };
        for (def, seen) in self.lineage().iter().rev() {
            let mut candidates = def.implemented_as(seen);
            candidates.insert(0, seen.clone());
            for candidate in candidates {
                if candidate.base() != Some(required_base) {
                    continue;
                }
                let mut bindings = Bindings::new();
                if candidate.bind(required, &mut bindings) {
                    return self.descriptor.substitute(&bindings);
                }
            }
        }
        self.descriptor.clone()
    }

    /// Hooks to run for an instance built as `origin`, ancestor-first, in declaration order within
    /// a type. Each hook comes with the specialization of the type that declares it.
    #[must_use]
    pub fn post_inits(self: &Arc<Self>, origin: &Descriptor) -> Vec<(Callable, Descriptor)> {
        let mut bindings = Bindings::new();
        self.descriptor.bind(origin, &mut bindings);

        let mut hooks = Vec::new();
        for (def, seen) in self.lineage() {
            let hook_origin = seen.substitute(&bindings);
            for hook in &def.hooks {
                hooks.push((hook.clone(), hook_origin.clone()));
            }
        }
        hooks
    }

    pub(crate) fn scoped_capability(&self, instance: &Instance) -> Option<ScopedCapability> {
        match self.resource.as_ref()? {
            ResourceProbe::Sync(probe) => probe(instance).map(ScopedCapability::Sync),
            ResourceProbe::Async(probe) => probe(instance).map(ScopedCapability::Async),
        }
    }

    /// Implemented interfaces rewritten for the descriptor `seen`.
    fn implemented_as(&self, seen: &Descriptor) -> Vec<Descriptor> {
        if self.implements.is_empty() {
            return Vec::new();
        }
        let mut bindings = Bindings::new();
        self.descriptor.bind(seen, &mut bindings);
        self.implements.iter().map(|implemented| implemented.substitute(&bindings)).collect()
    }
}

fn collect_lineage(def: &Arc<TypeDef>, seen: Descriptor, lineage: &mut Vec<(Arc<TypeDef>, Descriptor)>) {
    let mut bindings = Bindings::new();
    def.descriptor.bind(&seen, &mut bindings);

    for (base, args) in &def.bases {
        let base_seen = if args.is_empty() {
            base.descriptor.clone()
        } else {
            base.descriptor.clone().with_args(args.iter().map(|arg| arg.substitute(&bindings)))
        };
        collect_lineage(base, base_seen, lineage);
    }

    if !lineage.iter().any(|(known, _)| Arc::ptr_eq(known, def)) {
        lineage.push((def.clone(), seen));
    }
}

impl Debug for TypeDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("descriptor", &self.descriptor)
            .field("constructor", &self.constructor.name())
            .field("hooks", &self.hooks.len())
            .field("bases", &self.bases.iter().map(|(base, _)| base.descriptor()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec::Vec};

    use super::TypeDef;
    use crate::{
        callable::{Callable, Parameter, Produced},
        descriptor::Descriptor,
    };

    fn unit(name: &'static str) -> Callable {
        Callable::new(name, |_| Ok(Produced::value(())))
    }

    fn family(name: &'static str, vars: &[&'static str]) -> Descriptor {
        Descriptor::named(name).with_args(vars.iter().map(|var| Descriptor::var(*var)))
    }

    fn hierarchy() -> Arc<TypeDef> {
        let super_base = Arc::new(
            TypeDef::new(family("SuperBase", &["T"]), unit("SuperBase::new"))
                .post_init(unit("SuperBase::init").param(Parameter::untyped("self"))),
        );
        let base = Arc::new(
            TypeDef::new(family("Base", &["T", "U"]), unit("Base::new"))
                .extends(super_base, [Descriptor::var("U")])
                .post_init(unit("Base::init").param(Parameter::untyped("self"))),
        );
        Arc::new(
            TypeDef::new(family("Service", &["T", "U", "V"]), unit("Service::new"))
                .extends(base, [Descriptor::var("U"), Descriptor::var("V")])
                .post_init(unit("Service::init").param(Parameter::untyped("self"))),
        )
    }

    #[test]
    fn test_lineage_order() {
        let service = hierarchy();

        let lineage = service.lineage();
        let names = lineage.iter().map(|(def, _)| def.constructor().name()).collect::<Vec<_>>();

        assert_eq!(names, ["SuperBase::new", "Base::new", "Service::new"]);
        assert_eq!(lineage[0].1, Descriptor::named("SuperBase").with_args([Descriptor::var("V")]));
    }

    #[test]
    fn test_post_inits_bound_to_declaring_type() {
        let service = hierarchy();
        let origin = Descriptor::named("Service").with_args([Descriptor::of::<i32>(), Descriptor::of::<u8>(), Descriptor::of::<u16>()]);

        let hooks = service.post_inits(&origin);
        let names = hooks.iter().map(|(hook, _)| hook.name()).collect::<Vec<_>>();

        assert_eq!(names, ["SuperBase::init", "Base::init", "Service::init"]);
        assert_eq!(hooks[0].1, Descriptor::named("SuperBase").with_args([Descriptor::of::<u16>()]));
        assert_eq!(hooks[1].1, Descriptor::named("Base").with_args([Descriptor::of::<u8>(), Descriptor::of::<u16>()]));
        assert_eq!(hooks[2].1, origin);
    }

    #[test]
    fn test_specialize_through_ancestor() {
        let service = hierarchy();
        let required = Descriptor::named("Base").with_args([Descriptor::of::<u8>(), Descriptor::of::<u16>()]);

        let specialized = service.specialize(Some(&required));

        assert_eq!(
            specialized,
            Descriptor::named("Service").with_args([Descriptor::var("T"), Descriptor::of::<u8>(), Descriptor::of::<u16>()])
        );
    }

    #[test]
    fn test_assignability() {
        let service = hierarchy();
        let unrelated = Arc::new(TypeDef::new(Descriptor::named("Other"), unit("Other::new")).implements(Descriptor::named("Marker")));

        assert!(service.is_assignable_to(&Descriptor::named("Base").with_args([Descriptor::any(), Descriptor::of::<u8>()])));
        assert!(service.is_assignable_to(&Descriptor::named("SuperBase")));
        assert!(!service.is_assignable_to(&Descriptor::named("Other")));
        assert!(unrelated.is_assignable_to(&Descriptor::named("Marker")));
    }

    #[test]
    fn test_from_fn_descriptor() {
        struct Engine;

        let def = TypeDef::from_fn(|| Ok::<_, crate::InstantiateErrorKind>(Engine));

        assert_eq!(def.descriptor(), &Descriptor::of::<Engine>());
        assert_eq!(def.constructor().owner(), Some(&Descriptor::of::<Engine>()));
    }
}
