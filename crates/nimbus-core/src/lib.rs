//! Core engine for the Nimbus function runtime.
//!
//! This crate provides:
//! - Function cache: workspace discovery and compilation
//! - Module resolver and sandbox: `require`, cycle detection, memoization
//! - Function executor with the global interceptor chain
//! - Boot hook, reserved names and runtime configuration
//!
//! ```no_run
//! use nimbus_core::{InvocationContext, Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::new(RuntimeConfig::new("./functions"));
//! runtime.initialize()?;
//!
//! let ctx = InvocationContext::new("hello").with_query(serde_json::json!({ "name": "Ann" }));
//! let result = runtime.invoke("hello", &ctx, runtime.has_interceptor())?;
//! println!("{}", result.to_json());
//! # Ok::<(), nimbus_core::Error>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod execute;
pub mod hooks;
pub mod module;
mod runtime;

pub use cache::{Compiler, FunctionCache, FunctionRecord, ScriptCompiler};
pub use config::RuntimeConfig;
pub use error::{Error, ExecutionError, ResolveError, Result};
pub use execute::{
    FunctionExecutor, InvocationContext, InvocationResult, Transport, TransportClosed,
};
pub use hooks::{
    DEFAULT_FUNCTION, INIT_FUNCTION, INTERCEPTOR_FUNCTION, WEBSOCKET_FUNCTION, is_reserved,
};
pub use module::{CallChain, ModuleInstance, ModuleResolver, Resolution};
pub use runtime::Runtime;

pub use nimbus_script::Value;
