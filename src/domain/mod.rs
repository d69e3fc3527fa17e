//! Domain model: display inputs, layout derivation and render state.

pub mod error;
pub mod options;
pub mod types;

pub use error::SourceError;
pub use options::{MAX_PAGE_DIMENSION, MIN_PAGE_DIMENSION, derive_engine_options};
pub use types::{
    DisplayOptions, PageMargins, RenderState, ScoreInput, SessionPhase, ViewMode, Viewport,
};
