mod service;
mod shutdown;

pub use service::{build_chain, Service, ServiceParts};
pub use shutdown::ShutdownGuard;
