//! Decoding of raw model output.
//!
//! The dashboard prompt asks for bare JSON, but models still wrap it in a
//! markdown fence now and then. [`decode_dashboard`] strips an optional fence,
//! parses the body into [`DashboardData`] and validates it. Anything that does
//! not fit comes back as a [`DecodeError`]; callers treat it like any other
//! failed fetch.
//!
//! # Required and defaulted fields
//!
//! `current` with `aqi`, `pm25`, `pm10`, `temp` and `humidity` is required.
//! Everything else falls back to an empty string or empty list.

use serde_json::error::Category;

use crate::model::DashboardData;

/// Reply used when the model answers a simulation query with nothing.
pub const EMPTY_SIMULATION_REPLY: &str = "I couldn't generate a simulation result at this time.";

/// Why a dashboard payload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("model returned an empty payload")]
    Empty,

    #[error("model returned malformed JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("model output does not match the dashboard schema: {0}")]
    Schema(String),
}

/// Strip one optional leading ```` ```json ```` / ```` ``` ```` fence and one
/// trailing ```` ``` ```` fence.
pub fn strip_fences(raw: &str) -> &str {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix("```") {
        body = rest;
        if body.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
            body = &body[4..];
        }
        body = body.trim_start();
    }

    if let Some(rest) = body.strip_suffix("```") {
        body = rest.trim_end();
    }

    body
}

/// Decode a dashboard response.
pub fn decode_dashboard(raw: &str) -> Result<DashboardData, DecodeError> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    let data: DashboardData = serde_json::from_str(body).map_err(|e| match e.classify() {
        Category::Data => DecodeError::Schema(e.to_string()),
        _ => DecodeError::Json(e),
    })?;

    validate(&data)?;
    Ok(data)
}

fn validate(data: &DashboardData) -> Result<(), DecodeError> {
    let current = &data.current;

    for (field, value) in [
        ("pm25", current.pm25),
        ("pm10", current.pm10),
        ("temp", current.temp),
        ("humidity", current.humidity),
    ] {
        if !value.is_finite() {
            return Err(DecodeError::Schema(format!("current.{field} is not a finite number")));
        }
    }

    if current.pm25 < 0.0 || current.pm10 < 0.0 {
        return Err(DecodeError::Schema(
            "particulate concentrations must not be negative".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&current.humidity) {
        return Err(DecodeError::Schema(format!(
            "current.humidity {} is outside 0-100",
            current.humidity
        )));
    }

    Ok(())
}

/// Turn a raw simulation answer into the chat reply text.
pub fn simulation_reply(raw: String) -> String {
    if raw.trim().is_empty() {
        EMPTY_SIMULATION_REPLY.to_string()
    } else {
        raw
    }
}
