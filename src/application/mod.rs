//! Application layer: the viewer orchestrator and its supporting pieces.

pub mod error;
pub mod pagination;
pub mod session;
pub mod viewer;

pub use error::ViewerError;
pub use session::ScoreSession;
pub use viewer::ScoreViewer;
