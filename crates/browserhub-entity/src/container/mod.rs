//! Container descriptions shared by the pool and the runtime.

pub mod model;

pub use model::{ContainerHandle, ContainerInfo, PoolStatus};
