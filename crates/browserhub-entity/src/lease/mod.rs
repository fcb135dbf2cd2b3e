//! Virtual browser lease records.

pub mod model;

pub use model::{LeaseStatus, VirtualBrowserLease};
