//! Declarative output shapes and their validation.
//!
//! An [`OutputShape`] describes what a generation result must look like:
//! field names, primitive types, enumerated values, and array bounds. The
//! same value drives three things: the schema text embedded in every prompt,
//! validation of backend output, and the manual-fallback prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ShapeError, ShapeViolations};
use crate::generation::UseCase;

/// Allowed `action_type` values for action generation.
pub const ACTION_TYPES: [&str; 8] = [
    "speak", "move", "interact", "attack", "observe", "use_item", "rest", "wait",
];

/// The type of one node in an output shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum {
        values: Vec<String>,
    },
    Array {
        items: Box<ShapeKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Object {
        fields: Vec<FieldShape>,
    },
}

impl ShapeKind {
    /// Enumeration over the given string values.
    pub fn one_of(values: &[&str]) -> Self {
        ShapeKind::Enum {
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Array of `items` with at least one element.
    pub fn non_empty_array(items: ShapeKind) -> Self {
        ShapeKind::Array {
            items: Box::new(items),
            min_items: Some(1),
            max_items: None,
        }
    }
}

/// One named field of an object shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldShape {
    pub name: String,
    pub shape: ShapeKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

impl FieldShape {
    pub fn required(name: &str, shape: ShapeKind) -> Self {
        Self {
            name: name.to_string(),
            shape,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: &str, shape: ShapeKind) -> Self {
        Self {
            name: name.to_string(),
            shape,
            required: false,
            description: None,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Named root shape of a generation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputShape {
    pub name: String,
    pub root: ShapeKind,
}

impl OutputShape {
    pub fn new(name: impl Into<String>, root: ShapeKind) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Character action options: `[{thought, speech?, action, action_type}]`.
    pub fn action_options() -> Self {
        Self::new(
            "action_options",
            ShapeKind::non_empty_array(ShapeKind::Object {
                fields: vec![
                    FieldShape::required("thought", ShapeKind::String)
                        .describe("the character's private reasoning"),
                    FieldShape::optional("speech", ShapeKind::String)
                        .describe("words spoken aloud, if any"),
                    FieldShape::required("action", ShapeKind::String)
                        .describe("what the character attempts to do"),
                    FieldShape::required("action_type", ShapeKind::one_of(&ACTION_TYPES)),
                ],
            }),
        )
    }

    /// Objective proposals: `[{objective, rationale, priority, horizon}]`.
    pub fn objective_proposals() -> Self {
        Self::new(
            "objective_proposals",
            ShapeKind::non_empty_array(ShapeKind::Object {
                fields: vec![
                    FieldShape::required("objective", ShapeKind::String),
                    FieldShape::required("rationale", ShapeKind::String),
                    FieldShape::required("priority", ShapeKind::one_of(&["low", "medium", "high"])),
                    FieldShape::required(
                        "horizon",
                        ShapeKind::one_of(&["immediate", "short_term", "long_term"]),
                    ),
                ],
            }),
        )
    }

    /// Memory summary: `{summary, key_events, emotional_tone?}`.
    pub fn memory_summary() -> Self {
        Self::new(
            "memory_summary",
            ShapeKind::Object {
                fields: vec![
                    FieldShape::required("summary", ShapeKind::String)
                        .describe("a few sentences in the character's perspective"),
                    FieldShape::required(
                        "key_events",
                        ShapeKind::Array {
                            items: Box::new(ShapeKind::String),
                            min_items: None,
                            max_items: None,
                        },
                    ),
                    FieldShape::optional("emotional_tone", ShapeKind::String),
                ],
            },
        )
    }

    /// Check a parsed value against this shape, reporting every violation.
    pub fn validate(&self, value: &Value) -> Result<(), ShapeViolations> {
        let mut errors = Vec::new();
        check(&self.root, value, "$", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ShapeViolations::new(errors))
        }
    }
}

impl UseCase {
    /// The canonical result shape for this use case.
    pub fn default_shape(&self) -> OutputShape {
        match self {
            UseCase::ActionGeneration => OutputShape::action_options(),
            UseCase::ObjectivePlanning => OutputShape::objective_proposals(),
            UseCase::MemorySummary => OutputShape::memory_summary(),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check(kind: &ShapeKind, value: &Value, path: &str, errors: &mut Vec<ShapeError>) {
    let mismatch = |expected: &str| ShapeError {
        path: path.to_string(),
        message: format!("expected {expected}, got {}", type_name(value)),
    };

    match kind {
        ShapeKind::String => {
            if !value.is_string() {
                errors.push(mismatch("string"));
            }
        }
        ShapeKind::Integer => {
            if value.as_i64().is_none() && value.as_u64().is_none() {
                errors.push(mismatch("integer"));
            }
        }
        ShapeKind::Number => {
            if !value.is_number() {
                errors.push(mismatch("number"));
            }
        }
        ShapeKind::Boolean => {
            if !value.is_boolean() {
                errors.push(mismatch("boolean"));
            }
        }
        ShapeKind::Enum { values } => match value.as_str() {
            Some(s) if values.iter().any(|v| v == s) => {}
            Some(s) => errors.push(ShapeError {
                path: path.to_string(),
                message: format!("expected one of [{}], got \"{s}\"", values.join(", ")),
            }),
            None => errors.push(mismatch(&format!("one of [{}]", values.join(", ")))),
        },
        ShapeKind::Array {
            items,
            min_items,
            max_items,
        } => {
            let Some(array) = value.as_array() else {
                errors.push(mismatch("array"));
                return;
            };
            if let Some(min) = min_items {
                if array.len() < *min {
                    errors.push(ShapeError {
                        path: path.to_string(),
                        message: format!("expected at least {min} item(s), got {}", array.len()),
                    });
                }
            }
            if let Some(max) = max_items {
                if array.len() > *max {
                    errors.push(ShapeError {
                        path: path.to_string(),
                        message: format!("expected at most {max} item(s), got {}", array.len()),
                    });
                }
            }
            for (i, item) in array.iter().enumerate() {
                check(items, item, &format!("{path}[{i}]"), errors);
            }
        }
        ShapeKind::Object { fields } => {
            let Some(object) = value.as_object() else {
                errors.push(mismatch("object"));
                return;
            };
            for field in fields {
                let field_path = format!("{path}.{}", field.name);
                match object.get(&field.name) {
                    None | Some(Value::Null) if !field.required => {}
                    None => errors.push(ShapeError {
                        path: field_path,
                        message: "missing required field".to_string(),
                    }),
                    Some(Value::Null) => errors.push(ShapeError {
                        path: field_path,
                        message: "required field is null".to_string(),
                    }),
                    Some(v) => check(&field.shape, v, &field_path, errors),
                }
            }
        }
    }
}
