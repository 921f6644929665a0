//! Expression evaluator (C4) and filter & selection engine (C5): the AST,
//! evaluation context, pure and streaming evaluators, and the path/filter
//! machinery they share (spec §4.4/§4.5).

#![deny(unsafe_code)]

pub mod ast;
pub mod context;
pub mod eval;
pub mod filter;
pub mod operators;
pub mod path;
pub mod stream;

pub use ast::{ArithOp, AttributeOpts, BoolOp, Expr, FilterAction, FilterRule, FilterSpec, PathStep, RelOp};
pub use context::{EvalContext, EvalMode, FunctionContext, Scope};
pub use eval::{evaluate, is_reserved};
pub use stream::evaluate_stream;
