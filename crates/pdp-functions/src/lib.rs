//! Function broker (C2): library registration, import resolution, and
//! type-checked invocation.

#![deny(unsafe_code)]

pub mod builtins;
pub mod imports;
pub mod registry;

pub use imports::{Import, ImportTable};
pub use registry::{Function, FunctionRegistry, Library};
