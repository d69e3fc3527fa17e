//! Wire envelope types for the spartito engine protocol.
//!
//! A client addresses an engine that may live in another execution context
//! (worker, subprocess, remote host). Every method call becomes a
//! [`RequestEnvelope`] tagged with a fresh correlation id; the host answers
//! with exactly one [`ResponseEnvelope`] carrying the same id. Correlation is
//! by id alone; the echoed `method` and `args` exist purely for diagnostics
//! and log lines on the receiving side.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single method invocation sent to an engine host.
///
/// Immutable once sent. `instance_id` selects one of potentially many logical
/// engine instances sharing the same transport; hosts construct instances
/// lazily on first reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id, unique among outstanding calls. Never reused while a
    /// call with this id is pending.
    pub id: Uuid,
    /// Target engine instance; `None` addresses the host's default instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,
    /// Engine method name, e.g. `renderToSVG`.
    pub method: String,
    /// Positional arguments, already serialized.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl RequestEnvelope {
    /// Build a request with a fresh correlation id.
    pub fn new(instance_id: Option<Uuid>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            instance_id,
            method: method.into(),
            args,
        }
    }
}

/// The host's answer to one [`RequestEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id copied verbatim from the request.
    pub id: Uuid,
    /// Echo of the requested method, for diagnostics only.
    pub method: String,
    /// Echo of the arguments, for diagnostics only.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Method result; `Value::Null` when the method produced nothing (or the
    /// host treated an unknown method as a no-op).
    pub result: Value,
    /// Engine-side failure description. When present, `result` is null and
    /// the client rejects the matching pending call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful response carrying `result`.
    pub fn success(request: &RequestEnvelope, result: Value) -> Self {
        Self {
            id: request.id,
            method: request.method.clone(),
            args: request.args.clone(),
            result,
            error: None,
        }
    }

    /// Failure response carrying an engine-side error description.
    pub fn failure(request: &RequestEnvelope, error: impl Into<String>) -> Self {
        Self {
            id: request.id,
            method: request.method.clone(),
            args: request.args.clone(),
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Whether the host reported a failure for this call.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Well-known method names with host-side lifecycle behavior.
///
/// `MODULE_READY` is answered only once the host's engine module finished its
/// asynchronous startup; `DESTROY` tears the addressed instance down and
/// reports the number of instances still alive.
pub mod methods {
    pub const MODULE_READY: &str = "moduleIsReady";
    pub const SET_OPTIONS: &str = "setOptions";
    pub const LOAD_DATA: &str = "loadData";
    pub const REDO_LAYOUT: &str = "redoLayout";
    pub const RENDER_TO_SVG: &str = "renderToSVG";
    pub const GET_PAGE_COUNT: &str = "getPageCount";
    pub const SELECT: &str = "select";
    pub const DESTROY: &str = "destroy";
}
