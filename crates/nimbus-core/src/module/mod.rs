//! Module resolution and sandboxing.
//!
//! A `require` specifier is classified ([`specifier`]), resolved to a
//! logical name, cycle-checked against the explicit [`CallChain`], executed
//! in a fresh [`sandbox`] scope and memoized by the [`ModuleResolver`].

mod chain;
mod net;
mod packages;
mod regexp;
mod resolver;
mod sandbox;
mod specifier;

pub use chain::CallChain;
pub use packages::{PackageRegistry, default_sdk};
pub use resolver::{ModuleInstance, ModuleResolver, Resolution};
pub use specifier::{SDK_SPECIFIER, Specifier, classify, is_local};
