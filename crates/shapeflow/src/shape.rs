use std::collections::BTreeMap;

use crate::method_type::MethodType;
use crate::substitution::Substitution;
use crate::types::Type;

/// Overloads of one method, tried in order, plus its visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub method_types: Vec<MethodType>,
    pub private: bool,
}

impl Entry {
    pub fn new(method_types: Vec<MethodType>, private: bool) -> Self {
        Self {
            method_types,
            private,
        }
    }

    pub fn public(method_types: Vec<MethodType>) -> Self {
        Self::new(method_types, false)
    }

    pub fn is_public(&self) -> bool {
        !self.private
    }

    fn subst(&self, subst: &Substitution) -> Self {
        Self {
            method_types: self
                .method_types
                .iter()
                .map(|method_type| subst.apply_method_type(method_type))
                .collect(),
            private: self.private,
        }
    }
}

/// The callable methods of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub ty: Type,
    pub methods: BTreeMap<String, Entry>,
}

impl Shape {
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            methods: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Applies `subst` to every overload. The described type becomes `ty` when given,
    /// otherwise the substituted current one.
    pub fn subst(&self, subst: &Substitution, ty: Option<Type>) -> Self {
        Self {
            ty: ty.unwrap_or_else(|| subst.apply(&self.ty)),
            methods: self
                .methods
                .iter()
                .map(|(name, entry)| (name.clone(), entry.subst(subst)))
                .collect(),
        }
    }

    /// Relabels the described type without touching the methods.
    pub fn update(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }

    /// The methods callable with an explicit receiver.
    pub fn public_shape(&self) -> Self {
        Self {
            ty: self.ty.clone(),
            methods: self
                .methods
                .iter()
                .filter(|(_, entry)| entry.is_public())
                .map(|(name, entry)| (name.clone(), entry.clone()))
                .collect(),
        }
    }
}
