#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub(crate) mod macros;

pub(crate) mod any;
pub(crate) mod base;
pub(crate) mod cache;
pub(crate) mod callable;
pub(crate) mod collection;
pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod dependency_tree;
pub(crate) mod descriptor;
pub(crate) mod errors;
pub(crate) mod injector;
pub(crate) mod registry;
pub(crate) mod resolution_stack;
pub(crate) mod resolver;
pub(crate) mod resource;
pub(crate) mod scope;
pub(crate) mod service;
pub(crate) mod type_def;

pub mod utils;

#[cfg(feature = "async")]
pub mod async_impl;

pub use any::{Instance, TypeInfo};
pub use callable::{Arguments, Callable, IntoAsyncCallable, IntoCallable, ParamKind, Parameter, Produced};
pub use collection::{ServiceMap, Services};
pub use config::Config;
pub use context::InjectionContext;
pub use descriptor::{Base, Bindings, Descriptor};
pub use errors::{CircularDependency, InstantiateErrorKind, PendingWork, RegistryErrorKind, ResolveErrorKind};
pub use injector::{Injector, InjectorRef};
pub use registry::{Provide, Registration, Registry};
pub use resolver::{RawTypeResolverFactory, ResolverFactory, TypeToken, WrappedTypeResolverFactory};
pub use resource::{AsyncGenerator, AsyncScopedResource, Generator, ScopedResource};
pub use scope::InjectionScope;
pub use type_def::TypeDef;
