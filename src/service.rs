pub(crate) mod base;
pub(crate) mod service_fn;

pub(crate) use base::Service;
pub(crate) use service_fn::service_fn;
