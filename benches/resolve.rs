#![allow(dead_code)]

use clapet::{Descriptor, Injector, InstantiateErrorKind, Registry, TypeDef};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

struct A(Arc<B>, Arc<C>);
struct B(i32);
struct C(Arc<CA>);
struct CA(Arc<CAA>);
struct CAA(Arc<CAAA>);
struct CAAA(Arc<CAAAA>);
struct CAAAA(Arc<CAAAAA>);
struct CAAAAA;

#[inline]
fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .add_scoped(TypeDef::from_fn(|| Ok::<_, InstantiateErrorKind>(CAAAAA)))
        .unwrap()
        .add_scoped(TypeDef::from_fn(|caaaaa: Arc<CAAAAA>| Ok::<_, InstantiateErrorKind>(CAAAA(caaaaa))))
        .unwrap()
        .add_scoped(TypeDef::from_fn(|caaaa: Arc<CAAAA>| Ok::<_, InstantiateErrorKind>(CAAA(caaaa))))
        .unwrap()
        .add_scoped(TypeDef::from_fn(|caaa: Arc<CAAA>| Ok::<_, InstantiateErrorKind>(CAA(caaa))))
        .unwrap()
        .add_scoped(TypeDef::from_fn(|caa: Arc<CAA>| Ok::<_, InstantiateErrorKind>(CA(caa))))
        .unwrap()
        .add_scoped(TypeDef::from_fn(|ca: Arc<CA>| Ok::<_, InstantiateErrorKind>(C(ca))))
        .unwrap()
        .add_singleton(TypeDef::from_fn(|| Ok::<_, InstantiateErrorKind>(B(2))))
        .unwrap()
        .add_transient(TypeDef::from_fn(|b: Arc<B>, c: Arc<C>| Ok::<_, InstantiateErrorKind>(A(b, c))))
        .unwrap();
    registry
}

#[inline]
fn injector_scoped_chain(injector: &Injector) {
    let app = injector.get_scoped_injector();
    let session = app.get_scoped_injector();
    let request = session.get_scoped_injector();
    let _ = request.get_scoped_injector();
}

#[inline]
fn injector_require(injector: &Injector) {
    let _ = injector.require_as::<A>().unwrap();
}

#[inline]
fn injector_require_generic(injector: &Injector, interface: &Descriptor) {
    let _ = injector.require(interface).unwrap();
}

#[inline]
fn injector_close(injector: &Injector) {
    let scoped = injector.get_scoped_injector();
    let _ = scoped.require_as::<A>().unwrap();

    scoped.close().unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let registry = registry();
    let root = Injector::new(&registry);
    let wrapped = Descriptor::wrapped(Descriptor::of::<A>());

    c.bench_function("injector_new", |b| b.iter(|| Injector::new(&registry)))
        .bench_function("injector_scoped_chain", |b| b.iter(|| injector_scoped_chain(&root)))
        .bench_function("injector_require", |b| b.iter(|| injector_require(&root.get_scoped_injector())))
        .bench_function("injector_require_with_cache", |b| {
            let scoped = root.get_scoped_injector();
            b.iter(|| injector_require(&scoped))
        })
        .bench_function("injector_require_generic", |b| {
            b.iter(|| injector_require_generic(&root, &wrapped))
        })
        .bench_function("injector_close", |b| b.iter(|| injector_close(&root)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
