use alloc::{borrow::Cow, boxed::Box, sync::Arc, vec, vec::Vec};
use core::{
    any::type_name,
    fmt::{self, Debug, Display, Formatter},
    future::Future,
};

use crate::{
    any::{Instance, TypeInfo},
    descriptor::{Bindings, Descriptor},
    errors::InstantiateErrorKind,
    resource::{AsyncGenerator, FnAsyncGenerator, FnGenerator, Generator},
    service::{service_fn, Service},
    utils::future::BoxFuture,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    KeywordOnly,
}

#[derive(Clone, Debug)]
pub struct Parameter {
    name: Cow<'static, str>,
    kind: ParamKind,
    hint: Option<Descriptor>,
}

impl Parameter {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, kind: ParamKind, hint: Option<Descriptor>) -> Self {
        Self {
            name: name.into(),
            kind,
            hint,
        }
    }

    #[inline]
    #[must_use]
    pub fn positional(name: impl Into<Cow<'static, str>>, hint: Descriptor) -> Self {
        Self::new(name, ParamKind::PositionalOrKeyword, Some(hint))
    }

    #[inline]
    #[must_use]
    pub fn positional_only(name: impl Into<Cow<'static, str>>, hint: Descriptor) -> Self {
        Self::new(name, ParamKind::PositionalOnly, Some(hint))
    }

    #[inline]
    #[must_use]
    pub fn keyword(name: impl Into<Cow<'static, str>>, hint: Descriptor) -> Self {
        Self::new(name, ParamKind::KeywordOnly, Some(hint))
    }

    /// Parameter without a declared type. Only valid when the caller supplies it positionally.
    #[inline]
    #[must_use]
    pub fn untyped(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, ParamKind::PositionalOrKeyword, None)
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &Cow<'static, str> {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn hint(&self) -> Option<&Descriptor> {
        self.hint.as_ref()
    }
}

/// Resolved arguments handed to a callable body.
#[derive(Clone, Default)]
pub struct Arguments {
    positional: Vec<Instance>,
    named: Vec<(Cow<'static, str>, Instance)>,
}

impl Arguments {
    #[inline]
    #[must_use]
    pub fn new(positional: Vec<Instance>, named: Vec<(Cow<'static, str>, Instance)>) -> Self {
        Self { positional, named }
    }

    #[inline]
    #[must_use]
    pub fn positional(&self) -> &[Instance] {
        &self.positional
    }

    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Instance> {
        self.named.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    /// # Errors
    /// Returns an error if there is no positional argument at `index` or it isn't a `T`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, InstantiateErrorKind> {
        let name: Cow<'static, str> = alloc::format!("#{index}").into();
        match self.positional.get(index) {
            Some(instance) => downcast_argument(instance.clone(), name),
            None => Err(InstantiateErrorKind::MissingArgument { name }),
        }
    }

    /// # Errors
    /// Returns an error if there is no named argument `name` or it isn't a `T`.
    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, InstantiateErrorKind> {
        let owned_name: Cow<'static, str> = Cow::Owned(name.into());
        match self.named(name) {
            Some(instance) => downcast_argument(instance.clone(), owned_name),
            None => Err(InstantiateErrorKind::MissingArgument { name: owned_name }),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn into_positional(self) -> Vec<Instance> {
        self.positional
    }
}

fn downcast_argument<T: Send + Sync + 'static>(instance: Instance, name: Cow<'static, str>) -> Result<Arc<T>, InstantiateErrorKind> {
    instance.downcast::<T>().map_err(|_| InstantiateErrorKind::IncorrectArgument {
        name,
        expected: type_name::<T>(),
    })
}

fn take_argument<T, I>(arguments: &mut I) -> Result<Arc<T>, InstantiateErrorKind>
where
    T: Send + Sync + 'static,
    I: Iterator<Item = Instance>,
{
    let name = TypeInfo::of::<T>().short_name();
    match arguments.next() {
        Some(instance) => downcast_argument(instance, name.into()),
        None => Err(InstantiateErrorKind::MissingArgument { name: name.into() }),
    }
}

/// What a callable body hands back to the executor.
pub enum Produced {
    Value(Instance),
    Generator(Box<dyn Generator>),
    AsyncGenerator(Box<dyn AsyncGenerator>),
    Future(BoxFuture<'static, Result<Instance, InstantiateErrorKind>>),
}

impl Produced {
    #[inline]
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Value(Arc::new(value))
    }

    #[inline]
    #[must_use]
    pub fn shared<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self::Value(value)
    }

    #[must_use]
    pub fn future<Fut, T, E>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind> + 'static,
    {
        Self::Future(Box::pin(async move {
            match future.await {
                Ok(value) => Ok(Arc::new(value) as Instance),
                Err(err) => Err(err.into()),
            }
        }))
    }

    /// One-shot generator. `setup` runs when the value is needed and returns it with the
    /// teardown that runs when the owning scope closes.
    #[must_use]
    pub fn generator<S, C, T, E>(setup: S) -> Self
    where
        S: FnOnce() -> Result<(Arc<T>, C), E> + Send + 'static,
        C: FnOnce() -> Result<(), E> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind> + 'static,
    {
        Self::Generator(Box::new(FnGenerator::new(setup)))
    }

    #[must_use]
    pub fn async_generator<S, SFut, C, CFut, T, E>(setup: S) -> Self
    where
        S: FnOnce() -> SFut + Send + 'static,
        SFut: Future<Output = Result<(Arc<T>, C), E>> + Send + 'static,
        C: FnOnce() -> CFut + Send + 'static,
        CFut: Future<Output = Result<(), E>> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind> + 'static,
    {
        Self::AsyncGenerator(Box::new(FnAsyncGenerator::new(setup)))
    }

    #[inline]
    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self, Produced::AsyncGenerator(_) | Produced::Future(_))
    }
}

impl Debug for Produced {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Produced::Value(_) => f.write_str("Produced::Value"),
            Produced::Generator(_) => f.write_str("Produced::Generator"),
            Produced::AsyncGenerator(_) => f.write_str("Produced::AsyncGenerator"),
            Produced::Future(_) => f.write_str("Produced::Future"),
        }
    }
}

trait CloneBody: Service<Arguments, Response = Produced, Error = InstantiateErrorKind> + Send + Sync {
    fn clone_box(&self) -> Box<dyn CloneBody>;
}

impl<T> CloneBody for T
where
    T: Service<Arguments, Response = Produced, Error = InstantiateErrorKind> + Clone + Send + Sync + 'static,
{
    #[inline]
    fn clone_box(&self) -> Box<dyn CloneBody> {
        Box::new(self.clone())
    }
}

/// Type-erased body of a callable. Each invocation runs on a fresh clone, so a body shared
/// behind `Arc` can be called through `&self`.
struct Body(Box<dyn CloneBody>);

impl Body {
    #[inline]
    fn invoke(&self, arguments: Arguments) -> Result<Produced, InstantiateErrorKind> {
        self.0.clone_box().call(arguments)
    }
}

impl Clone for Body {
    #[inline]
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

#[derive(Clone)]
struct CallableInner {
    name: Cow<'static, str>,
    params: Vec<Parameter>,
    returns: Option<Descriptor>,
    owner: Option<Descriptor>,
    body: Body,
}

/// Described function: signature, declared return type and a type-erased body.
///
/// Clones share identity, [`Callable::ptr_eq`] is what cycle detection compares.
#[derive(Clone)]
pub struct Callable {
    inner: Arc<CallableInner>,
}

impl Callable {
    #[must_use]
    pub fn new<F>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: FnMut(Arguments) -> Result<Produced, InstantiateErrorKind> + Clone + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(CallableInner {
                name: name.into(),
                params: Vec::new(),
                returns: None,
                owner: None,
                body: Body(Box::new(service_fn(body))),
            }),
        }
    }

    /// Builds a callable from a closure over `Arc`s. Parameters are positional and typed after
    /// the closure arguments, the return type is the `Ok` type.
    #[inline]
    #[must_use]
    pub fn from_fn<Args, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: IntoCallable<Args>,
    {
        f.into_callable(name.into())
    }

    #[inline]
    #[must_use]
    pub fn from_async_fn<Args, F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: IntoAsyncCallable<Args>,
    {
        f.into_callable(name.into())
    }

    #[inline]
    #[must_use]
    pub fn param(mut self, parameter: Parameter) -> Self {
        Arc::make_mut(&mut self.inner).params.push(parameter);
        self
    }

    #[inline]
    #[must_use]
    pub fn params<I>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = Parameter>,
    {
        Arc::make_mut(&mut self.inner).params.extend(parameters);
        self
    }

    #[inline]
    #[must_use]
    pub fn returns(mut self, descriptor: Descriptor) -> Self {
        Arc::make_mut(&mut self.inner).returns = Some(descriptor);
        self
    }

    /// Declares the generic type the callable belongs to, its variables are bound from the
    /// origin the callable is invoked for.
    #[inline]
    #[must_use]
    pub fn owned_by(mut self, descriptor: Descriptor) -> Self {
        Arc::make_mut(&mut self.inner).owner = Some(descriptor);
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    #[must_use]
    pub fn signature(&self) -> &[Parameter] {
        &self.inner.params
    }

    #[inline]
    #[must_use]
    pub fn return_hint(&self) -> Option<&Descriptor> {
        self.inner.returns.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Option<&Descriptor> {
        self.inner.owner.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Variables bound by the owner specialization `belongs_to` first, then by matching the
    /// declared return type against `required`.
    #[must_use]
    pub fn bindings_for(&self, belongs_to: Option<&Descriptor>, required: Option<&Descriptor>) -> Bindings {
        let mut bindings = Bindings::new();
        if let (Some(owner), Some(belongs_to)) = (self.owner(), belongs_to) {
            owner.bind(belongs_to, &mut bindings);
        }
        if let (Some(returns), Some(required)) = (self.return_hint(), required) {
            returns.bind(required, &mut bindings);
        }
        bindings
    }

    /// Declared parameter types with `bindings` applied, in declaration order.
    #[must_use]
    pub fn get_signature_hints(&self, bindings: &Bindings) -> Vec<Option<Descriptor>> {
        self.inner
            .params
            .iter()
            .map(|param| param.hint().map(|hint| hint.substitute(bindings)))
            .collect()
    }

    /// # Errors
    /// Returns the failure raised by the body.
    #[inline]
    pub fn call(&self, arguments: Arguments) -> Result<Produced, InstantiateErrorKind> {
        self.inner.body.invoke(arguments)
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.inner.name)
            .field("params", &self.inner.params)
            .field("returns", &self.inner.returns)
            .finish_non_exhaustive()
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

pub trait IntoCallable<Args>: Clone + Send + Sync + 'static {
    type Provides: Send + Sync + 'static;

    fn into_callable(self, name: Cow<'static, str>) -> Callable;
}

pub trait IntoAsyncCallable<Args>: Clone + Send + Sync + 'static {
    type Provides: Send + Sync + 'static;

    fn into_callable(self, name: Cow<'static, str>) -> Callable;
}

macro_rules! impl_into_callable {
    ([$($ty:ident),*]) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, R, E, $($ty,)*> IntoCallable<($($ty,)*)> for F
        where
            F: Fn($(Arc<$ty>,)*) -> Result<R, E> + Clone + Send + Sync + 'static,
            R: Send + Sync + 'static,
            E: Into<InstantiateErrorKind>,
            $($ty: Send + Sync + 'static,)*
        {
            type Provides = R;

            fn into_callable(self, name: Cow<'static, str>) -> Callable {
                let params: Vec<Parameter> = vec![$(Parameter::positional(TypeInfo::of::<$ty>().short_name(), Descriptor::of::<$ty>()),)*];
                Callable::new(name, move |arguments: Arguments| {
                    let mut arguments = arguments.into_positional().into_iter();
                    $(
                        let $ty = take_argument::<$ty, _>(&mut arguments)?;
                    )*
                    (self)($($ty,)*).map(Produced::value).map_err(Into::into)
                })
                .params(params)
                .returns(Descriptor::of::<R>())
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, E, $($ty,)*> IntoAsyncCallable<($($ty,)*)> for F
        where
            F: Fn($(Arc<$ty>,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: Send + Sync + 'static,
            E: Into<InstantiateErrorKind> + 'static,
            $($ty: Send + Sync + 'static,)*
        {
            type Provides = R;

            fn into_callable(self, name: Cow<'static, str>) -> Callable {
                let params: Vec<Parameter> = vec![$(Parameter::positional(TypeInfo::of::<$ty>().short_name(), Descriptor::of::<$ty>()),)*];
                Callable::new(name, move |arguments: Arguments| {
                    let mut arguments = arguments.into_positional().into_iter();
                    $(
                        let $ty = take_argument::<$ty, _>(&mut arguments)?;
                    )*
                    Ok(Produced::future((self)($($ty,)*)))
                })
                .params(params)
                .returns(Descriptor::of::<R>())
            }
        }
    };
}

all_the_tuples!(impl_into_callable);

#[cfg(test)]
mod tests {
    use alloc::{sync::Arc, vec, vec::Vec};

    use super::{Arguments, Callable, ParamKind, Parameter, Produced};
    use crate::{
        descriptor::{Bindings, Descriptor},
        errors::InstantiateErrorKind,
    };

    struct Engine(u8);
    struct Car(Arc<Engine>);

    #[test]
    fn test_from_fn_signature() {
        let callable = Callable::from_fn("Car::new", |engine: Arc<Engine>| Ok::<_, InstantiateErrorKind>(Car(engine)));

        assert_eq!(callable.name(), "Car::new");
        assert_eq!(callable.signature().len(), 1);
        assert_eq!(callable.signature()[0].kind(), ParamKind::PositionalOrKeyword);
        assert_eq!(callable.signature()[0].hint(), Some(&Descriptor::of::<Engine>()));
        assert_eq!(callable.return_hint(), Some(&Descriptor::of::<Car>()));
    }

    #[test]
    fn test_from_fn_call() {
        let callable = Callable::from_fn("Car::new", |engine: Arc<Engine>| Ok::<_, InstantiateErrorKind>(Car(engine)));

        let produced = callable.call(Arguments::new(vec![Arc::new(Engine(4))], Vec::new())).unwrap();
        let Produced::Value(instance) = produced else {
            panic!("expected value");
        };
        assert_eq!(instance.downcast::<Car>().unwrap().0 .0, 4);
    }

    #[test]
    fn test_from_fn_incorrect_argument() {
        let callable = Callable::from_fn("Car::new", |engine: Arc<Engine>| Ok::<_, InstantiateErrorKind>(Car(engine)));

        let result = callable.call(Arguments::new(vec![Arc::new(1_u8)], Vec::new()));
        assert!(matches!(result, Err(InstantiateErrorKind::IncorrectArgument { .. })));

        let result = callable.call(Arguments::default());
        assert!(matches!(result, Err(InstantiateErrorKind::MissingArgument { .. })));
    }

    #[test]
    fn test_clones_share_identity() {
        let callable = Callable::new("f", |_| Ok(Produced::value(())));
        let other = Callable::new("f", |_| Ok(Produced::value(())));

        assert!(callable.ptr_eq(&callable.clone()));
        assert!(!callable.ptr_eq(&other));
    }

    #[test]
    fn test_signature_hints_from_owner_and_return() {
        let owner = Descriptor::named("Service").with_args([Descriptor::var("T")]);
        let callable = Callable::new("init", |_| Ok(Produced::value(())))
            .param(Parameter::untyped("self"))
            .param(Parameter::keyword("value", Descriptor::wrapped(Descriptor::var("T"))))
            .owned_by(owner.clone());

        let bindings = callable.bindings_for(Some(&owner.clone().with_args([Descriptor::of::<u8>()])), None);
        let hints = callable.get_signature_hints(&bindings);

        assert_eq!(hints, vec![None, Some(Descriptor::wrapped(Descriptor::of::<u8>()))]);
    }

    #[test]
    fn test_bindings_from_return() {
        let callable = Callable::new("resolver", |_| Ok(Produced::value(())))
            .param(Parameter::positional("cls", Descriptor::raw_type(Descriptor::var("T"))))
            .returns(Descriptor::named("Service").with_args([Descriptor::var("T")]));

        let bindings = callable.bindings_for(None, Some(&Descriptor::named("Service").with_args([Descriptor::of::<i32>()])));
        let mut expected = Bindings::new();
        expected.insert("T".into(), Descriptor::of::<i32>());

        assert_eq!(bindings, expected);
    }

    #[test]
    fn test_named_arguments() {
        let arguments = Arguments::new(Vec::new(), vec![("key".into(), Arc::new(3_u8))]);

        assert_eq!(*arguments.get_named::<u8>("key").unwrap(), 3);
        assert!(arguments.get_named::<u8>("missing").is_err());
        assert_eq!(arguments.len(), 1);
    }
}
