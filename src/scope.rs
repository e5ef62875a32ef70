use core::fmt::{self, Display, Formatter};

/// Lifetime policy of a registered service.
///
/// | Scope | Cached | Where |
/// |---|---|---|
/// | `Singleton` | yes | root frame of the instance pool |
/// | `Scoped` | yes | frame of the current scoped injector, never the root |
/// | `Transient` | no | resolved again on every request |
/// | `Immediate` | no | one-off calls such as [`crate::Injector::call`] |
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InjectionScope {
    Singleton,
    Scoped,
    Transient,
    Immediate,
}

impl InjectionScope {
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            InjectionScope::Singleton => "singleton",
            InjectionScope::Scoped => "scoped",
            InjectionScope::Transient => "transient",
            InjectionScope::Immediate => "immediate",
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, InjectionScope::Singleton | InjectionScope::Scoped)
    }
}

impl Display for InjectionScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
