use alloc::boxed::Box;
use core::{future::Future, pin::Pin};

/// Owned, `Send` future used wherever the engine stores or returns async work.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
