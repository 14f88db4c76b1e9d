use std::fmt;

use thiserror::Error;

/// A single field-level shape violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct ShapeError {
    /// JSON path of the offending node, e.g. `$[0].action_type`.
    pub path: String,
    pub message: String,
}

/// Every violation found while validating one value. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeViolations(Vec<ShapeError>);

impl ShapeViolations {
    pub fn new(errors: Vec<ShapeError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self(errors)
    }

    /// A violation at the document root, e.g. unparsable JSON.
    pub fn at_root(message: impl Into<String>) -> Self {
        Self(vec![ShapeError {
            path: "$".to_string(),
            message: message.into(),
        }])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShapeError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ShapeViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ShapeViolations {}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate backend identifier '{0}'")]
    DuplicateBackend(String),

    #[error("route for {use_case}/{tier} names unknown backend '{backend}'")]
    UnknownRoutedBackend {
        use_case: String,
        tier: String,
        backend: String,
    },

    #[error("backend '{0}' has zero capacity")]
    ZeroCapacity(String),

    #[error("window steps must be strictly ascending by max_capacity")]
    UnorderedWindowSteps,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Errors from the manual-fallback input channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManualInputError {
    #[error("manual input cancelled")]
    Cancelled,

    #[error("manual input channel closed")]
    Closed,
}

/// Errors from constructing a backend adapter.
#[derive(Debug, Error)]
pub enum AdapterBuildError {
    #[error("missing credential in environment variable '{0}'")]
    MissingCredential(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_error_display() {
        let err = ShapeError {
            path: "$[0].action".into(),
            message: "missing required field".into(),
        };
        assert_eq!(err.to_string(), "$[0].action: missing required field");
    }

    #[test]
    fn test_violations_join() {
        let v = ShapeViolations::new(vec![
            ShapeError {
                path: "$.a".into(),
                message: "x".into(),
            },
            ShapeError {
                path: "$.b".into(),
                message: "y".into(),
            },
        ]);
        assert_eq!(v.to_string(), "$.a: x; $.b: y");
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::UnknownRoutedBackend {
            use_case: "memory_summary".into(),
            tier: "mild".into(),
            backend: "ghost".into(),
        };
        assert_eq!(
            err.to_string(),
            "route for memory_summary/mild names unknown backend 'ghost'"
        );
    }
}
