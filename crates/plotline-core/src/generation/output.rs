//! Extraction and validation of structured output from raw completions.
//!
//! Backends wrap their JSON in all sorts of ways: code fences, a sentence of
//! preamble, trailing notes. Extraction tries, in order:
//!
//! 1. the body of the first ``` fence (with or without a `json` tag)
//! 2. the first balanced `{...}` or `[...]` span, string-aware
//! 3. the whole trimmed text
//!
//! The extracted JSON is then validated against the expected shape. When
//! the shape is an array and a count was requested, surplus items are
//! trimmed; a short array is accepted as-is.

use serde_json::Value;

use plotline_types::error::ShapeViolations;
use plotline_types::shape::{OutputShape, ShapeKind};

/// Locate the JSON payload inside a raw completion.
pub fn extract_json(raw: &str) -> &str {
    if let Some(body) = fenced_body(raw) {
        return body.trim();
    }
    if let Some(span) = balanced_span(raw) {
        return span;
    }
    raw.trim()
}

/// Parse, validate, and count-normalize a raw completion.
pub fn parse_output(
    raw: &str,
    shape: &OutputShape,
    desired_count: Option<u32>,
) -> Result<Value, ShapeViolations> {
    let payload = extract_json(raw);
    if payload.is_empty() {
        return Err(ShapeViolations::at_root("empty output"));
    }

    let mut value: Value = serde_json::from_str(payload)
        .map_err(|e| ShapeViolations::at_root(format!("invalid JSON: {e}")))?;

    shape.validate(&value)?;

    if let (ShapeKind::Array { min_items, .. }, Some(n), Value::Array(items)) =
        (&shape.root, desired_count, &mut value)
    {
        // Never trim below the shape's own lower bound.
        let n = (n as usize).max(min_items.unwrap_or(0));
        if n > 0 && items.len() > n {
            tracing::debug!(returned = items.len(), desired = n, "Trimming surplus items");
            items.truncate(n);
        }
    }

    Ok(value)
}

fn fenced_body(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_ticks = &raw[open + 3..];
    // Skip the info string ("json", "JSON", ...) up to the end of the line.
    let body_start = after_ticks.find('\n')? + 1;
    let body = &after_ticks[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn balanced_span(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    // Unterminated: hand the tail to the parser so it reports the error.
    Some(&raw[start..])
}
