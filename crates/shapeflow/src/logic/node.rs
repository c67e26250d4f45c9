use crate::types::{Literal, TypeName};

use super::NodeId;

/// Typed-expression tree the interpreter walks. Every node carries the id its static type
/// is recorded under in the [`Typing`](crate::typing::Typing) store.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Local or instance variable read (`a`, `@x`).
    Var { id: NodeId, name: String },
    Assign {
        id: NodeId,
        name: String,
        value: Box<Node>,
    },
    /// `a, b = value`
    MultiAssign {
        id: NodeId,
        targets: Vec<String>,
        value: Box<Node>,
    },
    Literal { id: NodeId, value: Literal },
    /// Constant reference to a class or module.
    Const { id: NodeId, name: TypeName },
    Call {
        id: NodeId,
        receiver: Option<Box<Node>>,
        method: String,
        args: Vec<Node>,
    },
    And {
        id: NodeId,
        left: Box<Node>,
        right: Box<Node>,
    },
    Or {
        id: NodeId,
        left: Box<Node>,
        right: Box<Node>,
    },
    Case {
        id: NodeId,
        scrutinee: Option<Box<Node>>,
        whens: Vec<WhenClause>,
        else_body: Option<Box<Node>>,
    },
    /// Statement sequence; its value is the last statement.
    Begin { id: NodeId, body: Vec<Node> },
    Other { id: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenClause {
    pub patterns: Vec<Node>,
    pub body: Option<Node>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Var { id, .. }
            | Node::Assign { id, .. }
            | Node::MultiAssign { id, .. }
            | Node::Literal { id, .. }
            | Node::Const { id, .. }
            | Node::Call { id, .. }
            | Node::And { id, .. }
            | Node::Or { id, .. }
            | Node::Case { id, .. }
            | Node::Begin { id, .. }
            | Node::Other { id } => *id,
        }
    }

    pub fn var(id: NodeId, name: impl Into<String>) -> Self {
        Node::Var {
            id,
            name: name.into(),
        }
    }

    pub fn call(id: NodeId, receiver: Node, method: impl Into<String>, args: Vec<Node>) -> Self {
        Node::Call {
            id,
            receiver: Some(Box::new(receiver)),
            method: method.into(),
            args,
        }
    }
}
