pub(crate) mod injector;

pub use injector::Injector;
