//! # formloom-codemodel
//!
//! The declarative statement/expression tree consumed and produced by the
//! formloom serialization engine.
//!
//! Nodes are plain serde-serializable data with no identity beyond the
//! textual names they carry. The engine builds them when persisting a live
//! component graph and walks them when reconstructing one; rendering them to
//! source text (and parsing text back) is the job of an external code
//! generation backend.
//!
//! ## Core Types
//!
//! - [`Value`] — primitive literal payload
//! - [`Expression`] — references, literals, creations, invocations
//! - [`Statement`] — assignments, event attachment, bare expressions
//! - [`TypeDecl`] / [`MethodDecl`] / [`FieldDecl`] — synthesized declarations
//! - [`CodeNode`] — the polymorphic unit handed to deserializers

mod expr;
mod stmt;
mod value;

pub use expr::{BinaryOperator, Expression};
pub use stmt::{CodeNode, FieldDecl, MethodDecl, Statement, TypeDecl};
pub use value::Value;
