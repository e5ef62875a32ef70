use alloc::{borrow::Cow, collections::BTreeMap, sync::Arc, vec::Vec};
use core::fmt::{self, Debug, Display, Formatter};

use crate::{
    any::TypeInfo,
    collection::{ServiceMap, Services},
    resolver::TypeToken,
};

/// Open type variables bound to the descriptors they stand for.
pub type Bindings = BTreeMap<Cow<'static, str>, Descriptor>;

/// Base of a parameterized descriptor: a Rust type or a named generic family.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Base {
    Type(TypeInfo),
    Named(Cow<'static, str>),
}

impl Display for Base {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Base::Type(type_info) => Display::fmt(type_info, f),
            Base::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Node {
    Any,
    Var(Cow<'static, str>),
    Type { base: Base, args: Vec<Descriptor> },
}

/// Structural identity of a possibly generic type.
///
/// Two descriptors are equal when they have the same base and the same generic arguments.
/// [`Descriptor::any`] and open variables ([`Descriptor::var`]) act as wildcards when they
/// appear on the registration side of [`Descriptor::matches`].
///
/// Cloning is cheap, the tree is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Descriptor(Arc<Node>);

impl Descriptor {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_base(Base::Type(TypeInfo::of::<T>()))
    }

    /// A generic family identified by name, parameterized later with [`Descriptor::with_args`].
    #[inline]
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::from_base(Base::Named(name.into()))
    }

    #[inline]
    #[must_use]
    pub fn any() -> Self {
        Self(Arc::new(Node::Any))
    }

    #[inline]
    #[must_use]
    pub fn var(name: impl Into<Cow<'static, str>>) -> Self {
        Self(Arc::new(Node::Var(name.into())))
    }

    /// Request for the raw type `inner` itself, answered with a [`TypeToken`].
    #[inline]
    #[must_use]
    pub fn raw_type(inner: Descriptor) -> Self {
        Self::of::<TypeToken>().with_args([inner])
    }

    /// Request for the descriptor `inner` itself.
    #[inline]
    #[must_use]
    pub fn wrapped(inner: Descriptor) -> Self {
        Self::of::<Descriptor>().with_args([inner])
    }

    /// Request for every service assignable to `inner`, answered with [`Services`].
    #[inline]
    #[must_use]
    pub fn services(inner: Descriptor) -> Self {
        Self::of::<Services>().with_args([inner])
    }

    /// Like [`Descriptor::services`], answered with a [`ServiceMap`] keyed by implementation name.
    #[inline]
    #[must_use]
    pub fn service_map(inner: Descriptor) -> Self {
        Self::of::<ServiceMap>().with_args([inner])
    }

    /// Replaces the generic arguments. Wildcards have no arguments and are returned unchanged.
    #[must_use]
    pub fn with_args<I>(self, args: I) -> Self
    where
        I: IntoIterator<Item = Descriptor>,
    {
        match &*self.0 {
            Node::Type { base, .. } => Self(Arc::new(Node::Type {
                base: base.clone(),
                args: args.into_iter().collect(),
            })),
            Node::Any | Node::Var(_) => self,
        }
    }

    #[inline]
    fn from_base(base: Base) -> Self {
        Self(Arc::new(Node::Type { base, args: Vec::new() }))
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> Option<&Base> {
        match &*self.0 {
            Node::Type { base, .. } => Some(base),
            Node::Any | Node::Var(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn generic_params(&self) -> &[Descriptor] {
        match &*self.0 {
            Node::Type { args, .. } => args,
            Node::Any | Node::Var(_) => &[],
        }
    }

    #[inline]
    #[must_use]
    pub fn type_info(&self) -> Option<TypeInfo> {
        match self.base() {
            Some(Base::Type(type_info)) => Some(*type_info),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(&*self.0, Node::Any)
    }

    #[inline]
    #[must_use]
    pub fn is_var(&self) -> bool {
        matches!(&*self.0, Node::Var(_))
    }

    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(&*self.0, Node::Any | Node::Var(_))
    }

    /// `true` when no wildcard appears anywhere in the tree.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match &*self.0 {
            Node::Any | Node::Var(_) => false,
            Node::Type { args, .. } => args.iter().all(Descriptor::is_concrete),
        }
    }

    /// Number of non-wildcard nodes, used to rank competing registrations.
    #[must_use]
    pub fn specificity(&self) -> usize {
        match &*self.0 {
            Node::Any | Node::Var(_) => 0,
            Node::Type { args, .. } => 1 + args.iter().map(Descriptor::specificity).sum::<usize>(),
        }
    }

    /// Whether a request for `self` may be served by a registration under `registered`.
    ///
    /// Wildcards on the registration side match anything, an unparameterized registration
    /// matches every parameterization of its base, otherwise arities must agree and the
    /// arguments are matched pairwise.
    #[must_use]
    pub fn matches(&self, registered: &Descriptor) -> bool {
        match (&*self.0, &*registered.0) {
            (_, Node::Any | Node::Var(_)) => true,
            (Node::Any | Node::Var(_), Node::Type { .. }) => false,
            (Node::Type { base, args }, Node::Type { base: registered_base, args: registered_args }) => {
                if base != registered_base {
                    return false;
                }
                if registered_args.is_empty() {
                    return true;
                }
                if args.is_empty() {
                    return registered_args.iter().all(Descriptor::is_wildcard);
                }
                args.len() == registered_args.len() && args.iter().zip(registered_args).all(|(arg, registered)| arg.matches(registered))
            }
        }
    }

    /// Symmetric variant of [`Descriptor::matches`], wildcards on either side match anything.
    #[must_use]
    pub fn is_compatible(&self, other: &Descriptor) -> bool {
        match (&*self.0, &*other.0) {
            (Node::Any | Node::Var(_), _) | (_, Node::Any | Node::Var(_)) => true,
            (Node::Type { base, args }, Node::Type { base: other_base, args: other_args }) => {
                base == other_base
                    && (args.is_empty()
                        || other_args.is_empty()
                        || (args.len() == other_args.len() && args.iter().zip(other_args).all(|(arg, other)| arg.is_compatible(other))))
            }
        }
    }

    /// Unifies `self`, read as a pattern, with `concrete` and records the variables it binds.
    ///
    /// Variables already present in `bindings` keep their value. Returns `false` when the
    /// shapes disagree, bindings collected before the disagreement are kept.
    pub fn bind(&self, concrete: &Descriptor, bindings: &mut Bindings) -> bool {
        match (&*self.0, &*concrete.0) {
            (Node::Var(name), _) => {
                bindings.entry(name.clone()).or_insert_with(|| concrete.clone());
                true
            }
            (Node::Any, _) => true,
            (Node::Type { base, args }, Node::Type { base: concrete_base, args: concrete_args }) if base == concrete_base => {
                if concrete_args.is_empty() {
                    return true;
                }
                if args.len() != concrete_args.len() {
                    return false;
                }
                let mut bound = true;
                for (arg, concrete_arg) in args.iter().zip(concrete_args) {
                    bound &= arg.bind(concrete_arg, bindings);
                }
                bound
            }
            _ => false,
        }
    }

    /// Replaces bound variables. Unbound variables are left in place.
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> Descriptor {
        if bindings.is_empty() {
            return self.clone();
        }
        match &*self.0 {
            Node::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Node::Any => self.clone(),
            Node::Type { base, args } => {
                if args.is_empty() {
                    return self.clone();
                }
                Self(Arc::new(Node::Type {
                    base: base.clone(),
                    args: args.iter().map(|arg| arg.substitute(bindings)).collect(),
                }))
            }
        }
    }
}

impl Display for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Node::Any => f.write_str("Any"),
            Node::Var(name) => f.write_str(name),
            Node::Type { base, args } => {
                Display::fmt(base, f)?;
                if let Some((first, rest)) = args.split_first() {
                    write!(f, "[{first}")?;
                    for arg in rest {
                        write!(f, ", {arg}")?;
                    }
                    f.write_str("]")?;
                }
                Ok(())
            }
        }
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor({self})")
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString as _;

    use super::{Bindings, Descriptor};

    fn service() -> Descriptor {
        Descriptor::named("Service")
    }

    #[test]
    fn test_exact_match() {
        let requested = service().with_args([Descriptor::of::<i32>()]);

        assert!(requested.matches(&service().with_args([Descriptor::of::<i32>()])));
        assert!(!requested.matches(&service().with_args([Descriptor::of::<u8>()])));
    }

    #[test]
    fn test_wildcard_match() {
        let requested = service().with_args([Descriptor::of::<i32>(), Descriptor::of::<u8>()]);

        assert!(requested.matches(&service().with_args([Descriptor::of::<i32>(), Descriptor::any()])));
        assert!(requested.matches(&service().with_args([Descriptor::var("T"), Descriptor::var("U")])));
        assert!(requested.matches(&service()));
        assert!(!requested.matches(&service().with_args([Descriptor::of::<u8>(), Descriptor::any()])));
        assert!(!requested.matches(&service().with_args([Descriptor::any()])));
        assert!(!Descriptor::any().matches(&service()));
    }

    #[test]
    fn test_specificity() {
        assert_eq!(Descriptor::any().specificity(), 0);
        assert_eq!(service().specificity(), 1);
        assert_eq!(service().with_args([Descriptor::of::<i32>(), Descriptor::any()]).specificity(), 2);
    }

    #[test]
    fn test_bind_and_substitute() {
        let pattern = service().with_args([Descriptor::var("T"), Descriptor::named("List").with_args([Descriptor::var("U")])]);
        let concrete = service().with_args([Descriptor::of::<i32>(), Descriptor::named("List").with_args([Descriptor::of::<u8>()])]);

        let mut bindings = Bindings::new();
        assert!(pattern.bind(&concrete, &mut bindings));
        assert_eq!(bindings.get("T"), Some(&Descriptor::of::<i32>()));
        assert_eq!(bindings.get("U"), Some(&Descriptor::of::<u8>()));
        assert_eq!(pattern.substitute(&bindings), concrete);
        assert!(concrete.is_concrete());
        assert!(!pattern.is_concrete());
    }

    #[test]
    fn test_bind_keeps_existing() {
        let mut bindings = Bindings::new();
        bindings.insert("T".into(), Descriptor::of::<u8>());

        assert!(Descriptor::var("T").bind(&Descriptor::of::<i32>(), &mut bindings));
        assert_eq!(bindings.get("T"), Some(&Descriptor::of::<u8>()));
    }

    #[test]
    fn test_display() {
        let descriptor = service().with_args([Descriptor::of::<i32>(), Descriptor::any(), Descriptor::var("T")]);

        assert_eq!(descriptor.to_string(), "Service[i32, Any, T]");
    }
}
