use alloc::{
    borrow::Cow,
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
};
use core::fmt::{self, Debug, Formatter};
use tracing::debug;

use crate::{
    callable::{Callable, Parameter},
    descriptor::Descriptor,
    errors::RegistryErrorKind,
    resolver::{ResolverFactory, ServiceResolver},
    scope::InjectionScope,
    type_def::TypeDef,
};

/// Metadata stored for one interface.
#[derive(Clone)]
pub struct Registration {
    pub(crate) scope: InjectionScope,
    pub(crate) interface: Descriptor,
    pub(crate) implementation: Descriptor,
    pub(crate) resolver: ServiceResolver,
    /// Added by the injector itself rather than by the user.
    pub(crate) ambient: bool,
}

impl Registration {
    #[inline]
    #[must_use]
    pub const fn scope(&self) -> InjectionScope {
        self.scope
    }

    #[inline]
    #[must_use]
    pub fn interface(&self) -> &Descriptor {
        &self.interface
    }

    #[inline]
    #[must_use]
    pub fn implementation(&self) -> &Descriptor {
        &self.implementation
    }

    #[inline]
    #[must_use]
    pub fn signature(&self) -> &[Parameter] {
        self.resolver.signature()
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("scope", &self.scope)
            .field("interface", &self.interface)
            .field("implementation", &self.implementation)
            .finish_non_exhaustive()
    }
}

/// Shape of a registration.
pub enum Provide {
    /// Registers the type under its own descriptor.
    Type(Arc<TypeDef>),
    /// Registers the type under an interface it is assignable to.
    Bind { interface: Descriptor, implementation: Arc<TypeDef> },
    /// Registers a resolver function under `interface`, or its declared return type.
    Resolver { interface: Option<Descriptor>, resolver: Callable },
    Factory { interface: Descriptor, factory: Arc<dyn ResolverFactory> },
}

impl Provide {
    #[inline]
    #[must_use]
    pub fn bind(interface: Descriptor, implementation: impl Into<Arc<TypeDef>>) -> Self {
        Self::Bind {
            interface,
            implementation: implementation.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn resolver(resolver: Callable) -> Self {
        Self::Resolver { interface: None, resolver }
    }

    #[inline]
    #[must_use]
    pub fn resolver_as(interface: Descriptor, resolver: Callable) -> Self {
        Self::Resolver {
            interface: Some(interface),
            resolver,
        }
    }

    #[inline]
    #[must_use]
    pub fn factory(interface: Descriptor, factory: impl ResolverFactory + 'static) -> Self {
        Self::Factory {
            interface,
            factory: Arc::new(factory),
        }
    }
}

impl From<TypeDef> for Provide {
    fn from(def: TypeDef) -> Self {
        Self::Type(Arc::new(def))
    }
}

impl From<Arc<TypeDef>> for Provide {
    fn from(def: Arc<TypeDef>) -> Self {
        Self::Type(def)
    }
}

impl From<Callable> for Provide {
    fn from(resolver: Callable) -> Self {
        Self::resolver(resolver)
    }
}

/// Interface descriptors mapped to their registrations.
///
/// Each injector works on its own copy, so registering after an injector was created doesn't
/// affect it.
#[derive(Clone, Default)]
pub struct Registry {
    entries: BTreeMap<Descriptor, Arc<Registration>>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.values()).finish()
    }
}

impl Registry {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// - Returns [`RegistryErrorKind::DuplicateRegistration`] if the exact interface is already registered
    /// - Returns [`RegistryErrorKind::IncompatibleInterface`] if a bound type isn't assignable to its interface
    /// - Returns [`RegistryErrorKind::MissingReturnHint`] if a resolver has neither an interface nor a return type
    pub fn provide(&mut self, scope: InjectionScope, shape: impl Into<Provide>) -> Result<&mut Self, RegistryErrorKind> {
        let registration = match shape.into() {
            Provide::Type(def) => Registration {
                scope,
                interface: def.descriptor().clone(),
                implementation: def.descriptor().clone(),
                resolver: ServiceResolver::Default(def),
                ambient: false,
            },
            Provide::Bind { interface, implementation } => {
                if !implementation.is_assignable_to(&interface) {
                    return Err(RegistryErrorKind::IncompatibleInterface {
                        interface,
                        implementation: implementation.descriptor().clone(),
                    });
                }
                Registration {
                    scope,
                    interface,
                    implementation: implementation.descriptor().clone(),
                    resolver: ServiceResolver::Default(implementation),
                    ambient: false,
                }
            }
            Provide::Resolver { interface, resolver } => {
                let interface = match interface.or_else(|| resolver.return_hint().cloned()) {
                    Some(interface) => interface,
                    None => {
                        return Err(RegistryErrorKind::MissingReturnHint {
                            callable: Cow::Owned(resolver.name().into()),
                        })
                    }
                };
                Registration {
                    scope,
                    implementation: interface.clone(),
                    interface,
                    resolver: ServiceResolver::Function(resolver),
                    ambient: false,
                }
            }
            Provide::Factory { interface, factory } => Registration {
                scope,
                implementation: interface.clone(),
                interface,
                resolver: ServiceResolver::Factory(factory),
                ambient: false,
            },
        };
        self.insert(registration)
    }

    /// # Errors
    /// See [`Registry::provide`]
    #[inline]
    pub fn add_singleton(&mut self, shape: impl Into<Provide>) -> Result<&mut Self, RegistryErrorKind> {
        self.provide(InjectionScope::Singleton, shape)
    }

    /// # Errors
    /// See [`Registry::provide`]
    #[inline]
    pub fn add_scoped(&mut self, shape: impl Into<Provide>) -> Result<&mut Self, RegistryErrorKind> {
        self.provide(InjectionScope::Scoped, shape)
    }

    /// # Errors
    /// See [`Registry::provide`]
    #[inline]
    pub fn add_transient(&mut self, shape: impl Into<Provide>) -> Result<&mut Self, RegistryErrorKind> {
        self.provide(InjectionScope::Transient, shape)
    }

    fn insert(&mut self, registration: Registration) -> Result<&mut Self, RegistryErrorKind> {
        if self.entries.contains_key(&registration.interface) {
            return Err(RegistryErrorKind::DuplicateRegistration {
                interface: registration.interface,
            });
        }
        debug!(interface = %registration.interface, scope = %registration.scope, "Registered");
        self.entries.insert(registration.interface.clone(), Arc::new(registration));
        Ok(self)
    }

    /// Registers an ambient resolver unless the exact interface is taken.
    pub(crate) fn provide_default(&mut self, scope: InjectionScope, interface: Descriptor, resolver: ServiceResolver) {
        if let Entry::Vacant(entry) = self.entries.entry(interface.clone()) {
            entry.insert(Arc::new(Registration {
                scope,
                implementation: interface.clone(),
                interface,
                resolver,
                ambient: true,
            }));
        }
    }

    #[must_use]
    pub fn is_registered(&self, interface: &Descriptor) -> bool {
        self.get_metadata(interface).is_some()
    }

    /// Exact registration, otherwise the most specific registration `interface` matches.
    /// Ties go to the registration whose descriptor orders first.
    #[must_use]
    pub fn get_metadata(&self, interface: &Descriptor) -> Option<&Arc<Registration>> {
        if let Some(registration) = self.entries.get(interface) {
            return Some(registration);
        }

        let mut best: Option<(usize, &Arc<Registration>)> = None;
        for (registered, registration) in &self.entries {
            if !interface.matches(registered) {
                continue;
            }
            let specificity = registered.specificity();
            if best.map_or(true, |(best_specificity, _)| specificity > best_specificity) {
                best = Some((specificity, registration));
            }
        }
        best.map(|(_, registration)| registration)
    }

    /// Independent snapshot of the registry.
    #[inline]
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registration> {
        self.entries.values().map(AsRef::as_ref)
    }
}
