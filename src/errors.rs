mod instantiate;
mod registry;
mod resolve;

pub use instantiate::InstantiateErrorKind;
pub use registry::RegistryErrorKind;
pub use resolve::{CircularDependency, PendingWork, ResolveErrorKind};
