//! Events the scheduler pushes to rooms and connections.

pub mod browser;

pub use browser::BrowserEvent;
