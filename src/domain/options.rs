//! Engine layout option derivation.
//!
//! Options are derived, never stored: every re-layout cycle recomputes the
//! full option map from the current display inputs and viewport, so there is
//! no drift between what the consumer asked for and what the engine holds.

use serde_json::{Map, Value, json};

use super::types::{DisplayOptions, ViewMode, Viewport};

/// Hard engine-unit limits for page dimensions. Values outside the range are
/// clamped, never rejected.
pub const MIN_PAGE_DIMENSION: f64 = 100.0;
pub const MAX_PAGE_DIMENSION: f64 = 60000.0;

/// Derive the engine option map for one re-layout cycle.
///
/// Page dimensions scale the container by `100/scale` and clamp into the
/// engine-unit range. Each margin uses its per-side override when non-zero,
/// else the shared default, scaled the same way. `vertical` forces an
/// unbounded page height with height auto-adjustment; `horizontal` forces an
/// unbounded page width, auto-adjustment, and no automatic page breaks.
pub fn derive_engine_options(display: &DisplayOptions, viewport: Viewport) -> Map<String, Value> {
    let zoom = 100.0 / f64::from(display.scale.max(1));

    let mut options = Map::new();
    options.insert("scale".into(), json!(display.scale));
    options.insert("header".into(), header_value(display.show_header));
    options.insert("footer".into(), header_value(display.show_footer));
    options.insert(
        "pageWidth".into(),
        json!(clamp_dimension(viewport.width * zoom)),
    );
    options.insert(
        "pageHeight".into(),
        json!(clamp_dimension(viewport.height * zoom)),
    );
    options.insert(
        "pageMarginTop".into(),
        json!(margin(display.margins.top, display.page_margin) * zoom),
    );
    options.insert(
        "pageMarginRight".into(),
        json!(margin(display.margins.right, display.page_margin) * zoom),
    );
    options.insert(
        "pageMarginBottom".into(),
        json!(margin(display.margins.bottom, display.page_margin) * zoom),
    );
    options.insert(
        "pageMarginLeft".into(),
        json!(margin(display.margins.left, display.page_margin) * zoom),
    );

    match display.view_mode {
        ViewMode::Page => {}
        ViewMode::Vertical => {
            options.insert("adjustPageHeight".into(), json!(true));
            options.insert("pageHeight".into(), json!(MAX_PAGE_DIMENSION));
        }
        ViewMode::Horizontal => {
            options.insert("adjustPageHeight".into(), json!(true));
            options.insert("breaks".into(), json!("none"));
            options.insert("pageWidth".into(), json!(MAX_PAGE_DIMENSION));
        }
    }

    // Passthrough entries win over derived ones.
    for (key, value) in &display.extra {
        options.insert(key.clone(), value.clone());
    }

    options
}

fn clamp_dimension(value: f64) -> f64 {
    value.clamp(MIN_PAGE_DIMENSION, MAX_PAGE_DIMENSION)
}

fn margin(side_override: f64, shared_default: f64) -> f64 {
    if side_override != 0.0 {
        side_override
    } else {
        shared_default
    }
}

fn header_value(visible: bool) -> Value {
    if visible { json!("encoded") } else { json!("none") }
}
