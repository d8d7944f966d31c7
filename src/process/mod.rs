//! Module H: subprocess lifecycle management for the download worker.

pub mod service_manager;

pub use service_manager::{ServiceContext, ServiceManager};
