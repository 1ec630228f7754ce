//! Error types for nimbus-core.

use std::path::PathBuf;
use std::time::Duration;

use nimbus_script::{CompileError, ScriptError};
use thiserror::Error;

/// Result type for nimbus-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while booting or administering a runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured workspace does not exist or is not a directory.
    #[error("workspace not found: {}", .0.display())]
    WorkspaceNotFound(PathBuf),

    /// Reading a workspace entry failed.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A function source failed to compile.
    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No function with the given name.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// An executor was requested for a record without a name.
    #[error("cannot execute a function record with an empty name")]
    EmptyFunction,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of module resolution.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A local specifier resolved to a name with no function record.
    #[error("module `{name}` not found (required as `{specifier}`)")]
    ModuleNotFound { specifier: String, name: String },

    /// The resolved name is already being resolved further up the chain.
    #[error("Circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// External specifier with no registered host package.
    #[error("package `{0}` not found")]
    PackageNotFound(String),

    /// The module body failed while running.
    #[error("failed to instantiate module `{name}`: {source}")]
    Instantiate {
        name: String,
        #[source]
        source: ScriptError,
    },

    /// A nested `require` failed.
    #[error("{module}: failed to require {specifier}: {source}")]
    Require {
        module: String,
        specifier: String,
        #[source]
        source: Box<ResolveError>,
    },

    /// Waiting for another thread to resolve the same module timed out.
    #[error("timed out after {waited:?} waiting for module `{name}`")]
    Contended { name: String, waited: Duration },
}

impl ResolveError {
    /// The innermost error below any `Require` wrappers.
    pub fn root_cause(&self) -> &ResolveError {
        match self {
            Self::Require { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the root cause is a circular dependency.
    pub fn is_circular(&self) -> bool {
        matches!(self.root_cause(), Self::CircularDependency { .. })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::ModuleNotFound { .. } => "ModuleNotFound",
            Self::CircularDependency { .. } => "CircularDependency",
            Self::PackageNotFound(_) => "PackageNotFound",
            Self::Instantiate { .. } => "InstantiateError",
            Self::Require { .. } => self.root_cause().kind(),
            Self::Contended { .. } => "ResolveTimeout",
        }
    }
}

/// Failures of a single invocation. Always captured in the result envelope.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Missing or malformed entry point or interceptor.
    #[error("FunctionExecutionError: {0}")]
    FunctionExecution(String),

    /// The function's module could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// User code failed.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The invocation panicked.
    #[error("function panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    pub(crate) fn function(message: impl Into<String>) -> Self {
        Self::FunctionExecution(message.into())
    }

    /// Short class name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FunctionExecution(_) => "FunctionExecutionError",
            Self::Resolve(err) => err.kind(),
            Self::Script(err) => err.class_name(),
            Self::Panicked(_) => "Panic",
        }
    }

    /// The resolve error behind this failure, if any, including one raised
    /// by a `require` call inside user code.
    pub fn resolve_error(&self) -> Option<&ResolveError> {
        match self {
            Self::Resolve(err) => Some(err),
            Self::Script(ScriptError::Host {
                source: Some(source),
                ..
            }) => source.downcast_ref::<ResolveError>(),
            _ => None,
        }
    }

    /// JSON form used in the `error` field of the result envelope.
    ///
    /// Values thrown by user code are passed through as thrown.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Script(ScriptError::Thrown(value)) => value.to_json(),
            other => serde_json::json!({
                "name": other.kind(),
                "message": other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_script::Value;

    #[test]
    fn test_circular_message_names_chain() {
        let err = ResolveError::CircularDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_require_wrapping_keeps_root_cause() {
        let inner = ResolveError::CircularDependency {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        let err = ResolveError::Require {
            module: "b".into(),
            specifier: "./a".into(),
            source: Box::new(inner),
        };
        assert!(err.is_circular());
        assert_eq!(
            err.to_string(),
            "b: failed to require ./a: Circular dependency detected: a -> b -> a"
        );
        assert_eq!(ExecutionError::from(err).kind(), "CircularDependency");
    }

    #[test]
    fn test_resolve_error_found_through_script_error() {
        let resolve = ResolveError::PackageNotFound("left-pad".into());
        let err = ExecutionError::Script(ScriptError::host_with_source("require failed", resolve));
        assert!(matches!(
            err.resolve_error(),
            Some(ResolveError::PackageNotFound(name)) if name == "left-pad"
        ));
    }

    #[test]
    fn test_thrown_value_passed_through() {
        let err = ExecutionError::Script(ScriptError::Thrown(Value::object([(
            "code",
            Value::from(7i64),
        )])));
        assert_eq!(err.to_json(), serde_json::json!({"code": 7}));
    }

    #[test]
    fn test_function_execution_envelope() {
        let err = ExecutionError::function("`main` function not found");
        assert_eq!(
            err.to_json(),
            serde_json::json!({
                "name": "FunctionExecutionError",
                "message": "FunctionExecutionError: `main` function not found",
            })
        );
    }
}
