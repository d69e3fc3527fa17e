//! Engine-facing trait seam.
//!
//! The notation engine itself is an external collaborator: it loads a score,
//! computes a layout and rasterizes pages to vector markup. This module only
//! fixes the surface the coordination layer consumes, so hosts and tests can
//! supply their own implementations.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Engine-side failure, carried verbatim into the response envelope.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The handful of engine operations the coordination layer actually uses,
/// plus a generic escape hatch for forward compatibility.
///
/// Implementations are driven from a single dispatch task per instance;
/// methods take `&mut self` and never need to be re-entrant.
pub trait NotationEngine: Send {
    fn set_options(&mut self, options: &Map<String, Value>) -> Result<(), EngineError>;

    /// Hand the document bytes to the engine. Engines do not signal failure
    /// for structurally invalid documents; a reported success is treated as
    /// authoritative even when the content is musically meaningless.
    fn load_data(&mut self, data: &[u8]) -> Result<(), EngineError>;

    fn redo_layout(&mut self) -> Result<(), EngineError>;

    fn render_to_svg(&mut self, page: u32) -> Result<String, EngineError>;

    fn get_page_count(&mut self) -> Result<u32, EngineError>;

    fn select(&mut self, filter: &Value) -> Result<bool, EngineError>;

    /// Release engine resources. Called exactly once, on instance teardown.
    fn destroy(&mut self) {}

    /// Invoke a method the typed surface does not enumerate. `None` means
    /// the capability is absent; the dispatcher answers such calls with a
    /// null result instead of an error.
    fn invoke(&mut self, _method: &str, _args: &[Value]) -> Option<Result<Value, EngineError>> {
        None
    }
}

/// Constructs engine instances on the host side, once the engine module has
/// finished its asynchronous startup.
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Box<dyn NotationEngine>, EngineError>;
}
