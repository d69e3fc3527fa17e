//! Rendering coordination for paginated music notation.
//!
//! The engine that typesets a score runs behind a message channel and is
//! addressed exclusively through correlated request/response envelopes. This
//! crate provides both sides of that seam plus the orchestration on top:
//!
//! - [`infra::rpc::EngineClient`] issues requests and matches responses back
//!   to their callers by correlation id.
//! - [`infra::rpc::EngineDispatcher`] hosts engine instances behind the
//!   channel, constructing each one lazily once the engine module is ready.
//! - [`application::ScoreViewer`] sequences load, debounced re-layout and
//!   pagination for one viewed score and publishes [`domain::RenderState`]
//!   snapshots on a watch channel.
//!
//! Engine implementations plug in through [`infra::engine::NotationEngine`];
//! the crate itself ships no typesetter.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;

pub use application::{ScoreSession, ScoreViewer, ViewerError};
pub use config::ViewerSettings;
pub use domain::{
    DisplayOptions, PageMargins, RenderState, ScoreInput, SessionPhase, SourceError, ViewMode,
    Viewport,
};
pub use infra::{
    EngineClient, EngineDispatcher, EngineError, EngineFactory, ModuleGate, NotationEngine,
    RpcError, spawn_host,
};
pub use util::Deferred;
