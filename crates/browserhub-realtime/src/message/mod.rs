//! Messages as they travel between nodes and to clients.

pub mod envelope;
pub mod target;

pub use envelope::MessageEnvelope;
pub use target::Target;
