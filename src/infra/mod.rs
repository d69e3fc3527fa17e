//! Infrastructure: transport, RPC, engine seam, fetch and telemetry.

pub mod channel;
pub mod engine;
pub mod fetch;
pub mod rpc;
pub mod telemetry;

pub use engine::{EngineError, EngineFactory, NotationEngine};
pub use rpc::{EngineClient, EngineDispatcher, ModuleGate, RpcError, spawn_host};
