use std::collections::BTreeMap;

use crate::method_type::{Block, Function, MethodType, TypeParam};
use crate::types::{ProcType, Type};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstitutionError {
    #[error("duplicated variable on merge: {name} is both {existing} and {incoming}")]
    DuplicateVariable {
        name: String,
        existing: Type,
        incoming: Type,
    },
    #[error("substitution expects {vars} types, got {values}")]
    ArityMismatch { vars: usize, values: usize },
}

/// Replacement for the `self`, `class` and `instance` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Anchors {
    pub self_type: Option<Type>,
    pub module_type: Option<Type>,
    pub instance_type: Option<Type>,
}

/// Immutable map from type variables and placeholders to types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    vars: BTreeMap<String, Type>,
    anchors: Anchors,
}

impl Substitution {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(
        vars: &[String],
        values: &[Type],
        anchors: Anchors,
    ) -> Result<Self, SubstitutionError> {
        if vars.len() != values.len() {
            return Err(SubstitutionError::ArityMismatch {
                vars: vars.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            vars: vars.iter().cloned().zip(values.iter().cloned()).collect(),
            anchors,
        })
    }

    pub fn from_anchors(anchors: Anchors) -> Self {
        Self {
            vars: BTreeMap::new(),
            anchors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
            && self.anchors.self_type.is_none()
            && self.anchors.module_type.is_none()
            && self.anchors.instance_type.is_none()
    }

    pub fn get(&self, var: &str) -> Option<&Type> {
        self.vars.get(var)
    }

    /// Composes `self` then `other`: existing values are rewritten by `other` before
    /// `other`'s own variables are added. Unset anchors are taken from `other`.
    pub fn merge(&self, other: &Substitution) -> Result<Self, SubstitutionError> {
        let mut vars: BTreeMap<String, Type> = self
            .vars
            .iter()
            .map(|(name, ty)| (name.clone(), other.apply(ty)))
            .collect();
        for (name, ty) in &other.vars {
            match vars.get(name) {
                Some(existing) if existing != ty => {
                    return Err(SubstitutionError::DuplicateVariable {
                        name: name.clone(),
                        existing: existing.clone(),
                        incoming: ty.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    vars.insert(name.clone(), ty.clone());
                }
            }
        }
        let anchors = Anchors {
            self_type: self
                .anchors
                .self_type
                .clone()
                .or_else(|| other.anchors.self_type.clone()),
            module_type: self
                .anchors
                .module_type
                .clone()
                .or_else(|| other.anchors.module_type.clone()),
            instance_type: self
                .anchors
                .instance_type
                .clone()
                .or_else(|| other.anchors.instance_type.clone()),
        };
        Ok(Self { vars, anchors })
    }

    pub fn update(&self, anchors: Anchors) -> Self {
        Self {
            vars: self.vars.clone(),
            anchors,
        }
    }

    pub fn update_self_type(&self, self_type: Option<Type>) -> Self {
        Self {
            vars: self.vars.clone(),
            anchors: Anchors {
                self_type,
                ..self.anchors.clone()
            },
        }
    }

    pub fn except<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut vars = self.vars.clone();
        for name in names {
            vars.remove(name);
        }
        Self {
            vars,
            anchors: self.anchors.clone(),
        }
    }

    pub fn apply(&self, ty: &Type) -> Type {
        if self.is_empty() {
            return ty.clone();
        }
        match ty {
            Type::SelfType => self.anchors.self_type.clone().unwrap_or(Type::SelfType),
            Type::Class => self.anchors.module_type.clone().unwrap_or(Type::Class),
            Type::Instance => self
                .anchors
                .instance_type
                .clone()
                .unwrap_or(Type::Instance),
            Type::Var(name) => self.vars.get(name).cloned().unwrap_or_else(|| ty.clone()),
            Type::ClassInstance { name, args } => Type::ClassInstance {
                name: name.clone(),
                args: self.apply_all(args),
            },
            Type::Interface { name, args } => Type::Interface {
                name: name.clone(),
                args: self.apply_all(args),
            },
            Type::Alias { name, args } => Type::Alias {
                name: name.clone(),
                args: self.apply_all(args),
            },
            Type::Union(types) => Type::union(self.apply_all(types)),
            Type::Intersection(types) => Type::intersection(self.apply_all(types)),
            Type::Tuple(types) => Type::Tuple(self.apply_all(types)),
            Type::Record(fields) => Type::Record(
                fields
                    .iter()
                    .map(|(key, ty)| (key.clone(), self.apply(ty)))
                    .collect(),
            ),
            Type::Proc(proc_type) => Type::Proc(Box::new(ProcType {
                function: self.apply_function(&proc_type.function),
                block: proc_type.block.as_ref().map(|block| self.apply_block(block)),
            })),
            Type::Any
            | Type::Top
            | Type::Bot
            | Type::Void
            | Type::Nil
            | Type::Boolean
            | Type::ClassSingleton { .. }
            | Type::Literal(_)
            | Type::Logic(_) => ty.clone(),
        }
    }

    fn apply_all(&self, types: &[Type]) -> Vec<Type> {
        types.iter().map(|ty| self.apply(ty)).collect()
    }

    pub fn apply_function(&self, function: &Function) -> Function {
        Function {
            params: function.params.map(|ty| self.apply(ty)),
            return_type: self.apply(&function.return_type),
        }
    }

    pub fn apply_block(&self, block: &Block) -> Block {
        Block {
            function: self.apply_function(&block.function),
            optional: block.optional,
            self_type: block.self_type.as_ref().map(|ty| self.apply(ty)),
        }
    }

    /// Applies to a method type, leaving the method's own type parameters untouched.
    pub fn apply_method_type(&self, method_type: &MethodType) -> MethodType {
        let inner = self.except(method_type.type_params.iter().map(|param| param.name.as_str()));
        MethodType {
            type_params: method_type
                .type_params
                .iter()
                .map(|param| TypeParam {
                    upper_bound: param.upper_bound.as_ref().map(|bound| inner.apply(bound)),
                    ..param.clone()
                })
                .collect(),
            function: inner.apply_function(&method_type.function),
            block: method_type.block.as_ref().map(|block| inner.apply_block(block)),
            decls: method_type.decls.clone(),
        }
    }
}
