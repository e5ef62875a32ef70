use alloc::{borrow::Cow, boxed::Box, vec::Vec};
use core::fmt::{self, Debug, Display, Formatter};
use parking_lot::Mutex;

use super::instantiate::InstantiateErrorKind;
use crate::{
    any::Instance,
    callable::Callable,
    descriptor::Descriptor,
    resource::AsyncGenerator,
    utils::future::BoxFuture,
};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("Service for interface '{interface}' not found")]
    ServiceNotFound { interface: Descriptor },
    #[error("Missing type hint for parameter '{parameter}' of '{callable}'")]
    MissingTypeHint {
        parameter: Cow<'static, str>,
        callable: Cow<'static, str>,
    },
    #[error("Scoped service for interface '{interface}' is not available in the root scope")]
    ScopedServiceNotAvailable { interface: Descriptor },
    #[error(transparent)]
    CircularDependency(CircularDependency),
    #[error("Cannot resolve async dependency '{callable}' in a sync injector")]
    AsyncInSyncInjector { callable: Cow<'static, str>, pending: PendingWork },
    #[error("Instance resolved for interface '{interface}' is not a `{expected}`")]
    IncorrectType { interface: Descriptor, expected: &'static str },
    #[error(transparent)]
    Instantiate(#[from] InstantiateErrorKind),
}

impl ResolveErrorKind {
    /// Stable identifier of the error, independent of its message.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            ResolveErrorKind::ServiceNotFound { .. } => "service.not_found",
            ResolveErrorKind::MissingTypeHint { .. } => "type_hint.missing",
            ResolveErrorKind::ScopedServiceNotAvailable { .. } => "scoped_service.not_available",
            ResolveErrorKind::CircularDependency(_) => "circular_dependency",
            ResolveErrorKind::AsyncInSyncInjector { .. } => "async_in_sync_injector",
            ResolveErrorKind::IncorrectType { .. } => "incorrect_type",
            ResolveErrorKind::Instantiate(err) => err.code(),
        }
    }
}

/// Callables in flight when a repeat was detected, from the first occurrence through the repeat.
#[derive(Clone)]
pub struct CircularDependency {
    trace: Vec<Callable>,
}

impl CircularDependency {
    #[inline]
    #[must_use]
    pub(crate) fn new(trace: Vec<Callable>) -> Self {
        Self { trace }
    }

    #[inline]
    #[must_use]
    pub fn trace(&self) -> &[Callable] {
        &self.trace
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.trace.iter().map(Callable::name).collect()
    }
}

impl Display for CircularDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Circular dependency detected: ")?;
        for (index, callable) in self.trace.iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            f.write_str(callable.name())?;
        }
        Ok(())
    }
}

impl Debug for CircularDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.trace.iter().map(Callable::name)).finish()
    }
}

impl core::error::Error for CircularDependency {}

/// Async work the sync executor refused to drive.
///
/// The future is handed over once through [`PendingWork::take`], so it can be awaited or dropped
/// by the caller instead of leaking silently.
pub struct PendingWork(Mutex<Option<BoxFuture<'static, Result<Instance, InstantiateErrorKind>>>>);

impl PendingWork {
    #[inline]
    #[must_use]
    pub(crate) fn new(future: BoxFuture<'static, Result<Instance, InstantiateErrorKind>>) -> Self {
        Self(Mutex::new(Some(future)))
    }

    /// Wraps a generator so that awaiting the work starts it and resumes it to its end.
    #[must_use]
    pub(crate) fn from_generator(mut generator: Box<dyn AsyncGenerator>) -> Self {
        Self::new(Box::pin(async move {
            let instance = generator.start().await?;
            generator.resume().await?;
            Ok(instance)
        }))
    }

    #[inline]
    #[must_use]
    pub fn take(&self) -> Option<BoxFuture<'static, Result<Instance, InstantiateErrorKind>>> {
        self.0.lock().take()
    }

    #[inline]
    #[must_use]
    pub fn is_taken(&self) -> bool {
        self.0.lock().is_none()
    }
}

impl Debug for PendingWork {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWork").field("taken", &self.is_taken()).finish()
    }
}
