//! Human- and model-readable rendering of output shapes.
//!
//! The rendering is derived mechanically from [`OutputShape`], so the
//! schema a backend sees, the schema a human sees during manual fallback,
//! and the schema validation enforces can never drift apart.
//!
//! ```text
//! [  // at least 1 item
//!   {
//!     "thought": string,  // required; the character's private reasoning
//!     "action_type": "speak" | "move" | ...,  // required
//!   }
//! ]
//! ```

use plotline_types::shape::{OutputShape, ShapeKind};

/// JSON-like skeleton of `shape` with requiredness and bounds as comments.
pub fn describe_shape(shape: &OutputShape) -> String {
    let mut out = String::new();
    render(&shape.root, 0, &mut out);
    out
}

/// A one-line instruction on result count, when the shape is an array.
pub fn count_hint(shape: &OutputShape, desired_count: Option<u32>) -> Option<String> {
    match (&shape.root, desired_count) {
        (ShapeKind::Array { .. }, Some(1)) => Some("Return exactly 1 item.".to_string()),
        (ShapeKind::Array { .. }, Some(n)) => Some(format!("Return exactly {n} items.")),
        _ => None,
    }
}

fn render(kind: &ShapeKind, indent: usize, out: &mut String) {
    match kind {
        ShapeKind::String => out.push_str("string"),
        ShapeKind::Integer => out.push_str("integer"),
        ShapeKind::Number => out.push_str("number"),
        ShapeKind::Boolean => out.push_str("true | false"),
        ShapeKind::Enum { values } => {
            let quoted: Vec<String> = values.iter().map(|v| format!("\"{v}\"")).collect();
            out.push_str(&quoted.join(" | "));
        }
        ShapeKind::Array {
            items,
            min_items,
            max_items,
        } => {
            out.push('[');
            if let Some(note) = bounds_note(*min_items, *max_items) {
                out.push_str("  // ");
                out.push_str(&note);
            }
            out.push('\n');
            pad(out, indent + 2);
            render(items, indent + 2, out);
            out.push('\n');
            pad(out, indent);
            out.push(']');
        }
        ShapeKind::Object { fields } => {
            out.push_str("{\n");
            for field in fields {
                pad(out, indent + 2);
                out.push('"');
                out.push_str(&field.name);
                out.push_str("\": ");
                render(&field.shape, indent + 2, out);
                out.push_str(",  // ");
                out.push_str(if field.required { "required" } else { "optional" });
                if let Some(description) = &field.description {
                    out.push_str("; ");
                    out.push_str(description);
                }
                out.push('\n');
            }
            pad(out, indent);
            out.push('}');
        }
    }
}

fn bounds_note(min: Option<usize>, max: Option<usize>) -> Option<String> {
    let plural = |n: usize| if n == 1 { "item" } else { "items" };
    match (min, max) {
        (Some(lo), Some(hi)) if lo == hi => Some(format!("exactly {lo} {}", plural(lo))),
        (Some(lo), Some(hi)) => Some(format!("{lo} to {hi} items")),
        (Some(lo), None) if lo > 0 => Some(format!("at least {lo} {}", plural(lo))),
        (_, Some(hi)) => Some(format!("at most {hi} {}", plural(hi))),
        _ => None,
    }
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat_n(' ', indent));
}
