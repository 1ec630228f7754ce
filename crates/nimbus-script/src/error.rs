//! Error types for nimbus-script.

use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Source translation failure.
///
/// Carries the logical name of the function being compiled and the
/// 1-based position of the offending token.
#[derive(Debug, Clone, Error)]
#[error("{name}:{line}:{col}: {message}")]
pub struct CompileError {
    /// Logical name of the source being compiled.
    pub name: String,
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub col: u32,
    /// Human readable description.
    pub message: String,
}

impl CompileError {
    pub(crate) fn new(name: &str, line: u32, col: u32, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            line,
            col,
            message: message.into(),
        }
    }
}

/// Runtime failure while evaluating a program.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// A value raised with `throw` and never caught.
    #[error("uncaught exception: {0}")]
    Thrown(Value),

    /// Operation applied to a value of the wrong type.
    #[error("type error: {0}")]
    Type(String),

    /// Unknown variable.
    #[error("reference error: {0} is not defined")]
    Reference(String),

    /// Evaluation step budget exhausted.
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    /// Call depth budget exhausted.
    #[error("maximum call depth of {0} exceeded")]
    CallDepth(usize),

    /// Failure reported by a host-provided capability.
    #[error("{message}")]
    Host {
        message: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },
}

impl ScriptError {
    /// Create a host error with a plain message.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
            source: None,
        }
    }

    /// Create a host error that keeps the typed cause.
    pub fn host_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Host {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Short error class name, as seen by `catch` blocks.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Thrown(_) => "Error",
            Self::Type(_) => "TypeError",
            Self::Reference(_) => "ReferenceError",
            Self::StepLimit(_) | Self::CallDepth(_) => "RangeError",
            Self::Host { .. } => "Error",
        }
    }

    /// Whether `try`/`catch` may intercept this error. Budget errors are not
    /// catchable so that a script cannot swallow its own step limit.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, Self::StepLimit(_) | Self::CallDepth(_))
    }

    /// Convert the error into the value bound by `catch (e)`.
    ///
    /// Thrown values are passed through untouched; every other error becomes
    /// an object with `name` and `message` fields.
    pub fn into_value(self) -> Value {
        match self {
            Self::Thrown(value) => value,
            other => {
                let message = match &other {
                    Self::Host { message, .. } => message.clone(),
                    _ => other.to_string(),
                };
                Value::object([
                    ("name", Value::from(other.class_name())),
                    ("message", Value::from(message)),
                ])
            }
        }
    }
}

/// Result alias for evaluator operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_display() {
        let err = CompileError::new("api/users", 3, 7, "unexpected token `}`");
        assert_eq!(err.to_string(), "api/users:3:7: unexpected token `}`");
    }

    #[test]
    fn test_thrown_value_passes_through_catch() {
        let err = ScriptError::Thrown(Value::from("boom"));
        assert_eq!(err.into_value(), Value::from("boom"));
    }

    #[test]
    fn test_type_error_becomes_object() {
        let value = ScriptError::Type("x is not callable".into()).into_value();
        assert_eq!(value.get("name"), Some(Value::from("TypeError")));
        assert_eq!(
            value.get("message"),
            Some(Value::from("type error: x is not callable"))
        );
    }

    #[test]
    fn test_host_error_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = ScriptError::host_with_source("require failed", io);
        let source = std::error::Error::source(&err).expect("source kept");
        assert_eq!(source.to_string(), "disk gone");
    }
}
