use thiserror::Error;

/// Failures while acquiring document bytes, raised before the engine is ever
/// involved.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Neither an in-memory payload nor a source URL was supplied. Raised
    /// before any network or engine call.
    #[error("no score input supplied: provide an in-memory payload or a source URL")]
    MissingInput,
    /// The source URL answered with a non-success status; the detail is the
    /// transport's status text.
    #[error("score fetch failed: {status}")]
    Fetch { status: String },
    /// The fetch never produced a status (connection refused, DNS, timeout).
    #[error("score fetch transport error: {message}")]
    Transport { message: String },
}
