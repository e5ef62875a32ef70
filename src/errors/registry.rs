use alloc::borrow::Cow;

use crate::descriptor::Descriptor;

#[derive(thiserror::Error, Debug)]
pub enum RegistryErrorKind {
    #[error("Service for interface '{interface}' is already registered")]
    DuplicateRegistration { interface: Descriptor },
    #[error("Implementation '{implementation}' is not compatible with interface '{interface}'")]
    IncompatibleInterface { interface: Descriptor, implementation: Descriptor },
    #[error("Resolver '{callable}' declares no return type to register it under")]
    MissingReturnHint { callable: Cow<'static, str> },
}

impl RegistryErrorKind {
    /// Stable identifier of the error, independent of its message.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            RegistryErrorKind::DuplicateRegistration { .. } => "duplicate_registration",
            RegistryErrorKind::IncompatibleInterface { .. } => "incompatible_interface",
            RegistryErrorKind::MissingReturnHint { .. } => "return_hint.missing",
        }
    }
}
