//! Container runtime adapters.

pub mod static_runtime;

pub use static_runtime::StaticContainerRuntime;
