use std::fmt;

use crate::types::Type;

use super::NodeId;

/// A tracked entry of the environment: a variable, or a pure call identified by its node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnvKey {
    Var(String),
    Call(NodeId),
}

impl fmt::Display for EnvKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvKey::Var(name) => f.write_str(name),
            EnvKey::Call(id) => write!(f, "call#{id}"),
        }
    }
}

/// Variable types plus the types of pure calls. Every update returns a new environment;
/// branches share structure and never observe each other's refinements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeEnv {
    locals: im::HashMap<String, Type>,
    pure_calls: im::HashMap<NodeId, Type>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, name: impl Into<String>, ty: Type) -> Self {
        Self {
            locals: self.locals.update(name.into(), ty),
            pure_calls: self.pure_calls.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.locals.get(name)
    }

    /// Records that the call at `id` is side-effect free and has type `ty`.
    pub fn add_pure_call(&self, id: NodeId, ty: Type) -> Self {
        Self {
            locals: self.locals.clone(),
            pure_calls: self.pure_calls.update(id, ty),
        }
    }

    pub fn pure_call(&self, id: NodeId) -> Option<&Type> {
        self.pure_calls.get(&id)
    }

    pub fn lookup(&self, key: &EnvKey) -> Option<&Type> {
        match key {
            EnvKey::Var(name) => self.get(name),
            EnvKey::Call(id) => self.pure_call(*id),
        }
    }

    pub fn refine(&self, key: &EnvKey, ty: Type) -> Self {
        match key {
            EnvKey::Var(name) => self.assign(name.clone(), ty),
            EnvKey::Call(id) => self.add_pure_call(*id, ty),
        }
    }

    /// Per-entry union of two environments; entries known to only one side are kept.
    pub fn join(&self, other: &TypeEnv) -> Self {
        let locals = self
            .locals
            .clone()
            .union_with(other.locals.clone(), |a, b| Type::union([a, b]));
        let pure_calls = self
            .pure_calls
            .clone()
            .union_with(other.pure_calls.clone(), |a, b| Type::union([a, b]));
        Self { locals, pure_calls }
    }
}
