use std::collections::BTreeMap;

use super::BuilderError;
use crate::substitution::{Anchors, Substitution};
use crate::types::Type;

/// Resolution context: what `self`, `class` and `instance` stand for, plus the upper
/// bounds of the type variables in scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Config {
    self_type: Option<Type>,
    class_type: Option<Type>,
    instance_type: Option<Type>,
    variable_bounds: BTreeMap<String, Type>,
}

impl Config {
    /// Fails when an anchor mentions `self`, `instance` or `class` anywhere in its tree.
    pub fn new(
        self_type: Option<Type>,
        class_type: Option<Type>,
        instance_type: Option<Type>,
        variable_bounds: BTreeMap<String, Type>,
    ) -> Result<Self, BuilderError> {
        for (slot, anchor) in [
            ("self", &self_type),
            ("class", &class_type),
            ("instance", &instance_type),
        ] {
            if let Some(ty) = anchor {
                if ty.mentions_placeholder() {
                    return Err(BuilderError::InvalidAnchor {
                        slot,
                        ty: ty.clone(),
                    });
                }
            }
        }
        Ok(Self {
            self_type,
            class_type,
            instance_type,
            variable_bounds,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Config whose three anchors all describe the nominal instance `ty`.
    pub fn for_instance(ty: Type) -> Result<Self, BuilderError> {
        let class_type = match &ty {
            Type::ClassInstance { name, .. } => Some(Type::singleton(name.clone())),
            _ => None,
        };
        Self::new(Some(ty.clone()), class_type, Some(ty), BTreeMap::new())
    }

    pub fn with_bounds(mut self, variable_bounds: BTreeMap<String, Type>) -> Self {
        self.variable_bounds = variable_bounds;
        self
    }

    pub fn self_type(&self) -> Option<&Type> {
        self.self_type.as_ref()
    }

    pub fn class_type(&self) -> Option<&Type> {
        self.class_type.as_ref()
    }

    pub fn instance_type(&self) -> Option<&Type> {
        self.instance_type.as_ref()
    }

    pub fn variable_bounds(&self) -> &BTreeMap<String, Type> {
        &self.variable_bounds
    }

    pub fn upper_bound(&self, name: &str) -> Option<&Type> {
        self.variable_bounds.get(name)
    }

    /// Anchor substitution, or `None` when no anchor is set.
    pub fn subst(&self) -> Option<Substitution> {
        if self.self_type.is_none() && self.class_type.is_none() && self.instance_type.is_none() {
            return None;
        }
        Some(Substitution::from_anchors(Anchors {
            self_type: self.self_type.clone(),
            module_type: self.class_type.clone(),
            instance_type: self.instance_type.clone(),
        }))
    }
}
