//! Invocation of functions.
//!
//! ```text
//! InvocationContext
//!     │
//!     └── FunctionExecutor::invoke
//!             │
//!             ├── ModuleResolver::load(name)       resolve + memoize
//!             ├── entry point: default || main
//!             ├── __interceptor__(ctx, next)?      when enabled
//!             │       └── next(ctx) → entry(ctx)
//!             └── InvocationResult { data | error, elapsed }
//! ```

mod context;
mod executor;
mod result;

pub use context::{InvocationContext, Transport, TransportClosed};
pub use executor::FunctionExecutor;
pub use result::InvocationResult;
