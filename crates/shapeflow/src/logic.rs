//! Flow narrowing: how a condition refines variable types on its true and false branches.
//!
//! Built-in predicates carry a [`LogicKind`](crate::types::LogicKind) as their return type
//! (see [`logic_kind_for`](crate::builder::logic_kind_for)); the interpreter dispatches on
//! that tag to decide which operand a call narrows and how.

mod env;
mod interpreter;
mod node;
mod type_case;

pub use self::env::{EnvKey, TypeEnv};
pub use self::interpreter::{CaseNarrowing, Evaluation, LogicTypeInterpreter};
pub use self::node::{Node, WhenClause};
pub use self::type_case::type_case_select;

pub type NodeId = u32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicError {
    #[error("no type recorded for node {0}")]
    Untyped(NodeId),
}
