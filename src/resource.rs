use alloc::{boxed::Box, sync::Arc};
use core::future::Future;
use tracing::{debug, warn};

use crate::{any::Instance, errors::InstantiateErrorKind, utils::future::BoxFuture};

/// One-shot generator: started once to obtain the value, resumed once at teardown.
pub trait Generator: Send {
    /// Runs the generator up to its single yield.
    ///
    /// # Errors
    /// Returns the failure raised by the setup part of the generator.
    fn start(&mut self) -> Result<Instance, InstantiateErrorKind>;

    /// Runs the generator past its yield. Reaching its end is a success.
    ///
    /// # Errors
    /// Returns the failure raised by the teardown part of the generator.
    fn resume(self: Box<Self>) -> Result<(), InstantiateErrorKind>;
}

/// Async counterpart of [`Generator`].
pub trait AsyncGenerator: Send {
    fn start(&mut self) -> BoxFuture<'_, Result<Instance, InstantiateErrorKind>>;

    fn resume(self: Box<Self>) -> BoxFuture<'static, Result<(), InstantiateErrorKind>>;
}

/// Value that must be entered after construction and exited when its scope ends.
pub trait ScopedResource: Send + Sync {
    fn enter(&self) -> Result<(), InstantiateErrorKind>;

    fn exit(&self) -> Result<(), InstantiateErrorKind>;
}

pub trait AsyncScopedResource: Send + Sync {
    fn enter(&self) -> BoxFuture<'_, Result<(), InstantiateErrorKind>>;

    fn exit(&self) -> BoxFuture<'_, Result<(), InstantiateErrorKind>>;
}

pub(crate) struct FnGenerator<S, C> {
    setup: Option<S>,
    teardown: Option<C>,
}

impl<S, C> FnGenerator<S, C> {
    #[inline]
    pub(crate) const fn new(setup: S) -> Self {
        Self {
            setup: Some(setup),
            teardown: None,
        }
    }
}

impl<S, C, T, E> Generator for FnGenerator<S, C>
where
    S: FnOnce() -> Result<(Arc<T>, C), E> + Send,
    C: FnOnce() -> Result<(), E> + Send,
    T: Send + Sync + 'static,
    E: Into<InstantiateErrorKind>,
{
    fn start(&mut self) -> Result<Instance, InstantiateErrorKind> {
        let setup = self.setup.take().ok_or(InstantiateErrorKind::AlreadyStarted)?;
        let (value, teardown) = setup().map_err(Into::into)?;
        self.teardown = Some(teardown);
        Ok(value as Instance)
    }

    fn resume(self: Box<Self>) -> Result<(), InstantiateErrorKind> {
        match self.teardown {
            Some(teardown) => teardown().map_err(Into::into),
            None => Ok(()),
        }
    }
}

pub(crate) struct FnAsyncGenerator<S, C> {
    setup: Option<S>,
    teardown: Option<C>,
}

impl<S, C> FnAsyncGenerator<S, C> {
    #[inline]
    pub(crate) const fn new(setup: S) -> Self {
        Self {
            setup: Some(setup),
            teardown: None,
        }
    }
}

impl<S, SFut, C, CFut, T, E> AsyncGenerator for FnAsyncGenerator<S, C>
where
    S: FnOnce() -> SFut + Send + 'static,
    SFut: Future<Output = Result<(Arc<T>, C), E>> + Send + 'static,
    C: FnOnce() -> CFut + Send + 'static,
    CFut: Future<Output = Result<(), E>> + Send + 'static,
    T: Send + Sync + 'static,
    E: Into<InstantiateErrorKind> + 'static,
{
    fn start(&mut self) -> BoxFuture<'_, Result<Instance, InstantiateErrorKind>> {
        Box::pin(async move {
            let setup = self.setup.take().ok_or(InstantiateErrorKind::AlreadyStarted)?;
            let (value, teardown) = setup().await.map_err(Into::into)?;
            self.teardown = Some(teardown);
            Ok(value as Instance)
        })
    }

    fn resume(self: Box<Self>) -> BoxFuture<'static, Result<(), InstantiateErrorKind>> {
        let teardown = self.teardown;
        Box::pin(async move {
            match teardown {
                Some(teardown) => teardown().await.map_err(Into::into),
                None => Ok(()),
            }
        })
    }
}

/// Capability found on a freshly built instance.
#[derive(Clone)]
pub(crate) enum ScopedCapability {
    Sync(Arc<dyn ScopedResource>),
    Async(Arc<dyn AsyncScopedResource>),
}

/// Started generator or entered resource, waiting for the end of its scope.
pub(crate) enum PendingResource {
    Generator(Box<dyn Generator>),
    AsyncGenerator(Box<dyn AsyncGenerator>),
    Resource(Arc<dyn ScopedResource>),
    AsyncResource(Arc<dyn AsyncScopedResource>),
}

impl PendingResource {
    #[inline]
    #[must_use]
    pub(crate) const fn is_async(&self) -> bool {
        matches!(self, PendingResource::AsyncGenerator(_) | PendingResource::AsyncResource(_))
    }

    /// Closes sync resources. Async ones can't be driven here and are released unclosed.
    pub(crate) fn close(self) -> Result<(), InstantiateErrorKind> {
        match self {
            PendingResource::Generator(generator) => {
                generator.resume()?;
                debug!("Generator resumed");
            }
            PendingResource::Resource(resource) => {
                resource.exit()?;
                debug!("Resource exited");
            }
            PendingResource::AsyncGenerator(_) | PendingResource::AsyncResource(_) => {
                warn!("Async resource released without being closed");
            }
        }
        Ok(())
    }

    pub(crate) async fn close_async(self) -> Result<(), InstantiateErrorKind> {
        match self {
            PendingResource::AsyncGenerator(generator) => {
                generator.resume().await?;
                debug!("Async generator resumed");
                Ok(())
            }
            PendingResource::AsyncResource(resource) => {
                resource.exit().await?;
                debug!("Async resource exited");
                Ok(())
            }
            sync => sync.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{boxed::Box, sync::Arc};
    use core::{
        convert::Infallible,
        sync::atomic::{AtomicU8, Ordering},
    };

    use super::{FnGenerator, Generator};
    use crate::errors::InstantiateErrorKind;

    #[test]
    fn test_generator_runs_teardown_once() {
        let closed = Arc::new(AtomicU8::new(0));
        let mut generator: Box<dyn Generator> = Box::new(FnGenerator::new({
            let closed = closed.clone();
            move || {
                Ok::<_, Infallible>((Arc::new(5_u8), move || {
                    closed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            }
        }));

        let value = generator.start().unwrap();
        assert_eq!(*value.downcast::<u8>().unwrap(), 5);
        assert!(matches!(generator.start(), Err(InstantiateErrorKind::AlreadyStarted)));

        generator.resume().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
