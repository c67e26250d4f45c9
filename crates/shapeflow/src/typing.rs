use std::collections::HashMap;

use crate::logic::{LogicError, NodeId};
use crate::types::Type;

/// Static types recorded per expression node.
#[derive(Debug, Clone, Default)]
pub struct Typing {
    types: HashMap<NodeId, Type>,
}

impl Typing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_typing(&mut self, id: NodeId, ty: Type) {
        self.types.insert(id, ty);
    }

    pub fn type_of(&self, id: NodeId) -> Result<&Type, LogicError> {
        self.types.get(&id).ok_or(LogicError::Untyped(id))
    }
}
