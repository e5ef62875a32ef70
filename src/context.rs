use crate::{descriptor::Descriptor, injector::InjectorRef, scope::InjectionScope};

/// Context a resolution step runs in, handed to [`crate::ResolverFactory`] implementations.
#[derive(Clone)]
pub struct InjectionContext {
    injector: InjectorRef,
    origin: Option<Descriptor>,
    scope: InjectionScope,
    required: Option<Descriptor>,
    positional_args: usize,
}

impl InjectionContext {
    #[inline]
    #[must_use]
    pub(crate) fn new(
        injector: InjectorRef,
        origin: Option<Descriptor>,
        scope: InjectionScope,
        required: Option<Descriptor>,
        positional_args: usize,
    ) -> Self {
        Self {
            injector,
            origin,
            scope,
            required,
            positional_args,
        }
    }

    #[inline]
    #[must_use]
    pub fn injector(&self) -> &InjectorRef {
        &self.injector
    }

    /// Specialized type the resolved callable belongs to, if any.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&Descriptor> {
        self.origin.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn scope(&self) -> InjectionScope {
        self.scope
    }

    /// Descriptor that was asked for. `None` for direct calls.
    #[inline]
    #[must_use]
    pub fn required(&self) -> Option<&Descriptor> {
        self.required.as_ref()
    }

    /// Number of positional arguments supplied by the caller.
    #[inline]
    #[must_use]
    pub const fn positional_args(&self) -> usize {
        self.positional_args
    }
}
