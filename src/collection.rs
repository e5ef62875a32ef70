use alloc::{
    collections::BTreeMap,
    string::{String, ToString as _},
    sync::Arc,
    vec::Vec,
};
use core::{
    fmt::{self, Debug, Formatter},
    slice,
};

use crate::{
    any::Instance,
    callable::{Callable, Produced},
    descriptor::Descriptor,
    registry::Registry,
    resolver::ServiceResolver,
    scope::InjectionScope,
};

/// Every service assignable to an interface, answered for [`Descriptor::services`].
///
/// Each service is resolved through its own registration, so singletons and scoped services
/// are shared with direct requests of them.
#[derive(Clone, Default)]
pub struct Services(Vec<Instance>);

impl Services {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Instance> {
        self.0.iter()
    }

    /// Services that are a `T`, the others are skipped.
    #[must_use]
    pub fn of_type<T: Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        self.0.iter().filter_map(|instance| instance.clone().downcast::<T>().ok()).collect()
    }

    #[inline]
    #[must_use]
    pub fn into_vec(self) -> Vec<Instance> {
        self.0
    }
}

impl Debug for Services {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").field("len", &self.0.len()).finish()
    }
}

/// [`Services`] keyed by implementation name, answered for [`Descriptor::service_map`].
#[derive(Clone, Default)]
pub struct ServiceMap(BTreeMap<String, Instance>);

impl ServiceMap {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Instance> {
        self.0.get(name)
    }

    #[must_use]
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.0.get(name).and_then(|instance| instance.clone().downcast::<T>().ok())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.0.iter().map(|(name, instance)| (name.as_str(), instance))
    }
}

impl Debug for ServiceMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.keys()).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CollectionKind {
    List,
    Map,
}

impl CollectionKind {
    pub(crate) fn descriptor(self, element: Descriptor) -> Descriptor {
        match self {
            CollectionKind::List => Descriptor::services(element),
            CollectionKind::Map => Descriptor::service_map(element),
        }
    }

    /// Callable gathering its positional arguments, `keys` name them in order.
    /// A key seen twice keeps the later service.
    pub(crate) fn collector(self, keys: Vec<String>) -> Callable {
        match self {
            CollectionKind::List => Callable::new("collect_services", |arguments| {
                Ok(Produced::value(Services(arguments.into_positional())))
            }),
            CollectionKind::Map => Callable::new("collect_service_map", move |arguments| {
                Ok(Produced::value(ServiceMap(keys.iter().cloned().zip(arguments.into_positional()).collect())))
            }),
        }
    }
}

/// Registration contributing one element to a collection.
pub(crate) struct Member {
    pub(crate) scope: InjectionScope,
    pub(crate) resolver: ServiceResolver,
    /// Descriptor the element is requested and cached as.
    pub(crate) required: Descriptor,
    pub(crate) key: String,
}

/// User registrations whose service is assignable to `element`, in registry order.
///
/// A generic registration is requested as its specialization for `element` when that is
/// concrete, otherwise under its own descriptor.
pub(crate) fn members(registry: &Registry, element: &Descriptor) -> Vec<Member> {
    let mut members = Vec::new();
    for registration in registry.iter().filter(|registration| !registration.ambient) {
        let interface = &registration.interface;
        let (required, key) = match &registration.resolver {
            ServiceResolver::Default(def) => {
                if !def.is_assignable_to(element) {
                    continue;
                }
                let required = if interface.is_concrete() {
                    interface.clone()
                } else {
                    Some(def.specialize(Some(element)))
                        .filter(Descriptor::is_concrete)
                        .unwrap_or_else(|| interface.clone())
                };
                let key = def.specialize(Some(&required)).to_string();
                (required, key)
            }
            ServiceResolver::Function(_) | ServiceResolver::Factory(_) => {
                if !interface.is_compatible(element) {
                    continue;
                }
                let required = if !interface.is_concrete() && element.is_concrete() && element.matches(interface) {
                    element.clone()
                } else {
                    interface.clone()
                };
                let key = required.to_string();
                (required, key)
            }
            ServiceResolver::Instantiated { .. } | ServiceResolver::Collection(_) => continue,
        };
        members.push(Member {
            scope: registration.scope,
            resolver: registration.resolver.clone(),
            required,
            key,
        });
    }
    members
}
