//! Small shared utilities.

pub mod deferred;
pub(crate) mod lock;

pub use deferred::Deferred;
