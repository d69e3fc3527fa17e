use thiserror::Error;

use crate::domain::error::SourceError;
use crate::infra::rpc::RpcError;

/// Failures surfaced by the viewer's public operations.
///
/// Load-sequence failures are additionally recorded on the published render
/// state (error flag plus stage message) and never leak to unrelated
/// callers; the variants here are what an individual call observes.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// A requested page was not an integer. Out-of-range integers are
    /// clamped, never rejected.
    #[error("page must be an integer, `{given}` given")]
    InvalidPage { given: String },
    /// The awaited load generation settled with a failure; the message is
    /// the stage-prefixed description also published on the render state.
    #[error("load failed: {message}")]
    LoadFailed { message: String },
    /// The viewer worker has shut down and can no longer accept commands.
    #[error("viewer is shut down")]
    ViewerClosed,
}
