//! The invocation result envelope.

use nimbus_script::Value;

use crate::error::ExecutionError;

/// Outcome of one invocation: data or error, plus elapsed time.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub outcome: Result<Value, ExecutionError>,
    /// Wall-clock milliseconds, truncated to microsecond precision.
    pub elapsed_ms: f64,
}

impl InvocationResult {
    pub(crate) fn new(outcome: Result<Value, ExecutionError>, elapsed: std::time::Duration) -> Self {
        Self {
            outcome,
            elapsed_ms: elapsed.as_micros() as f64 / 1000.0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn data(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        self.outcome.as_ref().err()
    }

    /// `{ data, time_usage }` or `{ error, time_usage }`.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.outcome {
            Ok(data) => serde_json::json!({
                "data": data.to_json(),
                "time_usage": self.elapsed_ms,
            }),
            Err(error) => serde_json::json!({
                "error": error.to_json(),
                "time_usage": self.elapsed_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_elapsed_truncated_to_micros() {
        let result = InvocationResult::new(Ok(Value::Null), Duration::from_nanos(1_234_567));
        assert_eq!(result.elapsed_ms, 1.234);
    }

    #[test]
    fn test_envelope_has_exactly_one_side() {
        let ok = InvocationResult::new(Ok(Value::from("hi")), Duration::ZERO).to_json();
        assert_eq!(ok["data"], serde_json::json!("hi"));
        assert!(ok.get("error").is_none());

        let err = InvocationResult::new(
            Err(ExecutionError::function("`main` function not found")),
            Duration::ZERO,
        )
        .to_json();
        assert!(err.get("data").is_none());
        assert_eq!(err["error"]["name"], serde_json::json!("FunctionExecutionError"));
    }
}
