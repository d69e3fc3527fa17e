//! Page candidate validation and clamping.
//!
//! Pages are 1-indexed. Candidates may arrive as typed integers or as loose
//! JSON values from a scripting surface; a non-integer candidate fails with
//! [`ViewerError::InvalidPage`], anything else is clamped into the valid
//! range instead of erroring.

use serde_json::Value;

use super::error::ViewerError;

/// Interpret a loose JSON value as a page candidate.
///
/// Accepts integers, integral floats (`3.0`) and numeric strings, matching
/// the tolerance of script-facing page inputs; everything else is an
/// [`ViewerError::InvalidPage`].
pub fn page_candidate(value: &Value) -> Result<i64, ViewerError> {
    let invalid = || ViewerError::InvalidPage {
        given: value.to_string(),
    };

    match value {
        Value::Number(number) => {
            if let Some(candidate) = number.as_i64() {
                return Ok(candidate);
            }
            match number.as_f64() {
                Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => {
                    Ok(float as i64)
                }
                _ => Err(invalid()),
            }
        }
        Value::String(text) => {
            let parsed: f64 = text.trim().parse().map_err(|_| invalid())?;
            if parsed.fract() == 0.0 && parsed.abs() < i64::MAX as f64 {
                Ok(parsed as i64)
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}

/// Clamp an integer candidate into `[1, page_count]`.
///
/// Before any document is loaded the page count is zero; the clamp then
/// commits page 1 and the count becomes authoritative after the first
/// successful layout.
pub fn clamp_page(candidate: i64, page_count: u32) -> u32 {
    candidate.clamp(1, i64::from(page_count.max(1))) as u32
}
