//! Policy compiler (C6) and combining-algorithm engine (C7): lowers
//! `Document` trees into per-subscription voters and folds a policy set's
//! member votes under its combining algorithm.

#![deny(unsafe_code)]

pub mod attrs;
pub mod combine;
pub mod compiler;
pub mod document;
pub mod vote;

pub use combine::fold;
pub use compiler::{compile_document, compile_policy, compile_policy_set, fold_votes, is_const, CompiledDocument};
pub use document::{CombiningAlgorithm, DefaultVote, Document, Entitlement, ErrorsMode, PolicyDoc, PolicySetDoc};
pub use vote::{IndeterminateTag, Vote};
