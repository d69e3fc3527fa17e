//! Core value types for the rendering coordination layer.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Page flow requested by the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Paged layout constrained by the container in both dimensions.
    #[default]
    Page,
    /// Single column: unbounded page height with height auto-adjustment.
    Vertical,
    /// Single system: unbounded page width, no automatic page breaks.
    Horizontal,
}

/// Per-side margin overrides in container units. A side left at zero falls
/// back to the shared default margin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageMargins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Last observed container dimensions, updated by an external resize
/// notifier. The coordination layer consumes the pair; how resizes are
/// detected is not its concern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Display inputs a re-layout is derived from.
///
/// Recomputed into an engine option map on every re-layout cycle; never
/// stored engine-side between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    /// Engine scale percentage.
    pub scale: u32,
    /// Shared default margin applied to sides without an override.
    pub page_margin: f64,
    /// Per-side margin overrides.
    pub margins: PageMargins,
    pub show_header: bool,
    pub show_footer: bool,
    pub view_mode: ViewMode,
    /// Arbitrary passthrough engine options, merged after the derived
    /// entries so callers can reach switches the typed surface does not
    /// enumerate.
    pub extra: Map<String, Value>,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            scale: 40,
            page_margin: 0.0,
            margins: PageMargins::default(),
            show_header: false,
            show_footer: false,
            view_mode: ViewMode::default(),
            extra: Map::new(),
        }
    }
}

/// Where the document bytes come from. Exactly one source should be
/// supplied per load; the sequencer rejects an empty input before any I/O.
#[derive(Debug, Clone, Default)]
pub struct ScoreInput {
    pub payload: Option<Bytes>,
    pub url: Option<String>,
    /// Optional element-selection filter forwarded to the engine after the
    /// bytes are acquired, when non-trivial.
    pub selection: Option<Value>,
}

impl ScoreInput {
    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Self::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_selection(mut self, selection: Value) -> Self {
        self.selection = Some(selection);
        self
    }

    /// A selection is forwarded only when it actually narrows something:
    /// `null` and `{}` are treated as absent.
    pub fn effective_selection(&self) -> Option<&Value> {
        match &self.selection {
            Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(value) => Some(value),
            None => None,
        }
    }
}

/// Lifecycle of one engine session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    ModuleReady,
    DocumentLoaded,
    /// Non-terminal: a later load attempt may recover.
    Error,
}

/// Snapshot of the rendering pipeline, published to consumers.
///
/// Read-only outside the orchestration layer; only the sequencer, scheduler
/// and pagination controller mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderState {
    /// 1-indexed page currently displayed.
    pub current_page: u32,
    /// Authoritative only after a successful load and layout; zero before.
    pub page_count: u32,
    /// Vector markup of the most recently rendered page.
    pub artifact: Option<String>,
    pub is_loading: bool,
    pub is_error: bool,
    /// Human-readable stage description, e.g. `rendering page 3`.
    pub status: String,
    pub viewport: Viewport,
}

impl RenderState {
    pub(crate) fn stage(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_selection_is_trivial() {
        let input = ScoreInput::from_payload("**kern".as_bytes().to_vec());
        assert!(input.effective_selection().is_none());

        let trivial = input.clone().with_selection(json!({}));
        assert!(trivial.effective_selection().is_none());

        let narrowing = input.with_selection(json!({"measureRange": "1-8"}));
        assert_eq!(
            narrowing.effective_selection(),
            Some(&json!({"measureRange": "1-8"}))
        );
    }

    #[test]
    fn display_options_default_to_hidden_chrome() {
        let options = DisplayOptions::default();
        assert_eq!(options.scale, 40);
        assert!(!options.show_header);
        assert!(!options.show_footer);
        assert_eq!(options.view_mode, ViewMode::Page);
    }
}
