//! Correlation-id RPC over the engine channel.
//!
//! The client half turns method calls into request envelopes and resolves
//! them from matching responses; the dispatcher half owns the actual engine
//! instances and serves the requests. Correctness rests on unique-id
//! correlation and idempotent settlement, not on call ordering.

pub mod client;
pub mod dispatcher;

use thiserror::Error;

pub use client::EngineClient;
pub use dispatcher::{EngineDispatcher, ModuleGate, spawn_host};

/// Failures observed by the calling side of the channel.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The transport closed before the call completed. Also reported for
    /// calls that were pending when the host went away.
    #[error("engine channel closed before the call completed")]
    ChannelClosed,
    /// The dispatcher signaled an engine-side failure for this call.
    #[error("engine call failed: {message}")]
    Engine { message: String },
    /// The call succeeded but the result did not have the shape the typed
    /// wrapper expected.
    #[error("engine returned an unexpected result shape for `{method}`")]
    UnexpectedResult { method: &'static str },
    /// The document bytes are not valid UTF-8. The envelope carries the
    /// document as text, so a binary payload cannot cross the channel
    /// unmangled; it is rejected before anything is sent.
    #[error("score document is not valid UTF-8 text")]
    NonTextPayload,
}
