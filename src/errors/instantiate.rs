use alloc::borrow::Cow;
use core::convert::Infallible;

/// Failure raised while user code builds, initializes or tears down a value.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error("Missing argument `{name}`")]
    MissingArgument { name: Cow<'static, str> },
    #[error("Argument `{name}` is not a `{expected}`")]
    IncorrectArgument { name: Cow<'static, str>, expected: &'static str },
    #[error("Generator was already started")]
    AlreadyStarted,
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<Infallible> for InstantiateErrorKind {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}

impl InstantiateErrorKind {
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &'static str {
        "instantiate"
    }
}
