use std::collections::BTreeSet;

use tracing::trace;

use super::env::{EnvKey, TypeEnv};
use super::node::{Node, WhenClause};
use super::type_case::{literal_select, type_case_select};
use super::{LogicError, NodeId};
use crate::subtyping::Subtyping;
use crate::types::{builtin, LogicKind, Type, TypeName};
use crate::typing::Typing;

/// Result of evaluating a condition: the environments and value types on each branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub truthy_env: TypeEnv,
    pub falsy_env: TypeEnv,
    /// Entries refined on at least one branch.
    pub changed: BTreeSet<EnvKey>,
    pub truthy_type: Type,
    pub falsy_type: Type,
}

impl Evaluation {
    fn unchanged(env: &TypeEnv, ty: Type) -> Self {
        Self {
            truthy_env: env.clone(),
            falsy_env: env.clone(),
            changed: BTreeSet::new(),
            truthy_type: ty.clone(),
            falsy_type: ty,
        }
    }

    fn predicate(truthy_env: TypeEnv, falsy_env: TypeEnv, changed: BTreeSet<EnvKey>) -> Self {
        Self {
            truthy_env,
            falsy_env,
            changed,
            truthy_type: Type::true_type(),
            falsy_type: Type::false_type(),
        }
    }
}

/// Environments for each `when` clause of a `case`, in order, and for the `else` branch.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseNarrowing {
    pub clauses: Vec<TypeEnv>,
    pub else_env: TypeEnv,
}

/// Narrows variable types along the branches of a condition.
pub struct LogicTypeInterpreter<'a> {
    subtyping: &'a dyn Subtyping,
    typing: &'a Typing,
}

impl<'a> LogicTypeInterpreter<'a> {
    pub fn new(subtyping: &'a dyn Subtyping, typing: &'a Typing) -> Self {
        Self { subtyping, typing }
    }

    pub fn type_case_select(&self, ty: &Type, name: &TypeName) -> (Type, Type) {
        type_case_select(self.subtyping, ty, name)
    }

    pub fn eval(&self, env: &TypeEnv, node: &Node) -> Result<Evaluation, LogicError> {
        match node {
            Node::Var { id, name } => {
                let ty = self.typing.type_of(*id)?;
                let (truthy, falsy) = self.subtyping.partition_union(ty);
                let key = EnvKey::Var(name.clone());
                Ok(Evaluation {
                    truthy_env: env.refine(&key, truthy.clone()),
                    falsy_env: env.refine(&key, falsy.clone()),
                    changed: BTreeSet::from([key]),
                    truthy_type: truthy,
                    falsy_type: falsy,
                })
            }
            Node::Assign { id, name, value } => {
                let inner = self.eval(env, value)?;
                let ty = self.typing.type_of(*id)?;
                let (truthy, falsy) = self.subtyping.partition_union(ty);
                let key = EnvKey::Var(name.clone());
                let mut changed = inner.changed;
                changed.insert(key.clone());
                Ok(Evaluation {
                    truthy_env: inner.truthy_env.refine(&key, truthy.clone()),
                    falsy_env: inner.falsy_env.refine(&key, falsy.clone()),
                    changed,
                    truthy_type: truthy,
                    falsy_type: falsy,
                })
            }
            Node::MultiAssign { id, targets, value } => self.eval_multi_assign(env, *id, targets, value),
            Node::Call {
                id,
                receiver,
                args,
                ..
            } => {
                let ty = self.typing.type_of(*id)?;
                if let Type::Logic(kind) = ty {
                    return self.eval_logic(env, *kind, receiver.as_deref(), args);
                }
                match env.pure_call(*id) {
                    Some(pure) => {
                        let (truthy, falsy) = self.subtyping.partition_union(pure);
                        let key = EnvKey::Call(*id);
                        Ok(Evaluation {
                            truthy_env: env.refine(&key, truthy.clone()),
                            falsy_env: env.refine(&key, falsy.clone()),
                            changed: BTreeSet::from([key]),
                            truthy_type: truthy,
                            falsy_type: falsy,
                        })
                    }
                    None => Ok(self.opaque(env, ty)),
                }
            }
            Node::And { left, right, .. } => {
                let lhs = self.eval(env, left)?;
                let rhs = self.eval(&lhs.truthy_env, right)?;
                let mut changed = lhs.changed;
                changed.extend(rhs.changed);
                Ok(Evaluation {
                    truthy_env: rhs.truthy_env,
                    falsy_env: lhs.falsy_env.join(&rhs.falsy_env),
                    changed,
                    truthy_type: rhs.truthy_type,
                    falsy_type: Type::union([lhs.falsy_type, rhs.falsy_type]),
                })
            }
            Node::Or { left, right, .. } => {
                let lhs = self.eval(env, left)?;
                let rhs = self.eval(&lhs.falsy_env, right)?;
                let mut changed = lhs.changed;
                changed.extend(rhs.changed);
                Ok(Evaluation {
                    truthy_env: lhs.truthy_env.join(&rhs.truthy_env),
                    falsy_env: rhs.falsy_env,
                    changed,
                    truthy_type: Type::union([lhs.truthy_type, rhs.truthy_type]),
                    falsy_type: rhs.falsy_type,
                })
            }
            Node::Begin { id, body } => match body.last() {
                Some(last) => self.eval(env, last),
                None => Ok(Evaluation::unchanged(env, self.recorded_or_nil(*id))),
            },
            Node::Literal { id, .. } => {
                let ty = self.typing.type_of(*id)?;
                let (truthy, falsy) = self.subtyping.partition_union(ty);
                Ok(Evaluation {
                    truthy_type: truthy,
                    falsy_type: falsy,
                    ..Evaluation::unchanged(env, Type::Bot)
                })
            }
            Node::Const { id, .. } | Node::Case { id, .. } | Node::Other { id } => {
                Ok(self.opaque(env, self.typing.type_of(*id)?))
            }
        }
    }

    fn opaque(&self, env: &TypeEnv, ty: &Type) -> Evaluation {
        Evaluation::unchanged(env, ty.clone())
    }

    fn recorded_or_nil(&self, id: NodeId) -> Type {
        self.typing.type_of(id).cloned().unwrap_or(Type::Nil)
    }

    fn eval_multi_assign(
        &self,
        env: &TypeEnv,
        id: NodeId,
        targets: &[String],
        value: &Node,
    ) -> Result<Evaluation, LogicError> {
        let inner = self.eval(env, value)?;
        let ty = self.typing.type_of(id)?;
        let (truthy, falsy) = self.subtyping.partition_union(ty);

        let elements: Option<Vec<Type>> = match self.expand(&truthy) {
            Type::Tuple(items) => Some(
                (0..targets.len())
                    .map(|index| match items.get(index) {
                        Some(item) => self.subtyping.partition_union(item).0,
                        None => Type::Nil,
                    })
                    .collect(),
            ),
            Type::ClassInstance { name, args }
                if name.as_str() == builtin::ARRAY && args.len() == 1 =>
            {
                Some(vec![Type::optional(args[0].clone()); targets.len()])
            }
            _ => None,
        };

        let mut changed = inner.changed;
        let mut truthy_env = inner.truthy_env;
        let mut falsy_env = inner.falsy_env;
        for (index, target) in targets.iter().enumerate() {
            let key = EnvKey::Var(target.clone());
            if let Some(elements) = &elements {
                truthy_env = truthy_env.refine(&key, elements[index].clone());
            }
            falsy_env = falsy_env.refine(&key, Type::Nil);
            changed.insert(key);
        }
        Ok(Evaluation {
            truthy_env,
            falsy_env,
            changed,
            truthy_type: truthy,
            falsy_type: falsy,
        })
    }

    fn expand(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        for _ in 0..32 {
            match self.subtyping.expand_alias(&current) {
                Some(expanded) => current = expanded,
                None => break,
            }
        }
        current
    }

    fn eval_logic(
        &self,
        env: &TypeEnv,
        kind: LogicKind,
        receiver: Option<&Node>,
        args: &[Node],
    ) -> Result<Evaluation, LogicError> {
        trace!(%kind, "logic call");
        let Some(receiver) = receiver else {
            return Ok(self.opaque(env, &Type::Logic(kind)));
        };
        match kind {
            LogicKind::Not => {
                let inner = self.eval(env, receiver)?;
                Ok(Evaluation::predicate(inner.falsy_env, inner.truthy_env, inner.changed))
            }
            LogicKind::ReceiverIsNil | LogicKind::ReceiverIsNotNil => {
                let ty = self.typing.type_of(receiver.id())?;
                let (nil, non_nil) = self.subtyping.partition_nil(ty);
                let (truthy, falsy) = if kind == LogicKind::ReceiverIsNil {
                    (nil, non_nil)
                } else {
                    (non_nil, nil)
                };
                Ok(self.refine_node_type(env, receiver, &truthy, &falsy))
            }
            LogicKind::ReceiverIsArg => {
                let Some(arg) = args.first() else {
                    return Ok(self.opaque(env, &Type::Logic(kind)));
                };
                let Some(name) = singleton_name(self.typing.type_of(arg.id())?) else {
                    return Ok(Evaluation::predicate(env.clone(), env.clone(), BTreeSet::new()));
                };
                let ty = self.typing.type_of(receiver.id())?;
                let (matched, unmatched) = self.type_case_select(ty, &name);
                Ok(self.refine_node_type(env, receiver, &matched, &unmatched))
            }
            LogicKind::ArgIsReceiver => {
                let Some(arg) = args.first() else {
                    return Ok(self.opaque(env, &Type::Logic(kind)));
                };
                let Some(name) = singleton_name(self.typing.type_of(receiver.id())?) else {
                    return Ok(Evaluation::predicate(env.clone(), env.clone(), BTreeSet::new()));
                };
                let ty = self.typing.type_of(arg.id())?;
                let (matched, unmatched) = self.type_case_select(ty, &name);
                Ok(self.refine_node_type(env, arg, &matched, &unmatched))
            }
            LogicKind::ArgEqualsReceiver => {
                let Some(arg) = args.first() else {
                    return Ok(self.opaque(env, &Type::Logic(kind)));
                };
                let receiver_type = self.typing.type_of(receiver.id())?;
                let ty = self.typing.type_of(arg.id())?;
                let literal = match (receiver, receiver_type) {
                    (Node::Literal { value, .. }, _) | (_, Type::Literal(value)) => Some(value),
                    _ => None,
                };
                let matched = match (literal, receiver_type) {
                    (Some(literal), _) => literal_select(self.subtyping, ty, literal),
                    (None, Type::ClassInstance { name, .. }) => self.type_case_select(ty, name).0,
                    (None, _) => ty.clone(),
                };
                // Inequality with one value rules nothing out.
                Ok(self.refine_node_type(env, arg, &matched, ty))
            }
            LogicKind::ArgIsAncestor => {
                let Some(arg) = args.first() else {
                    return Ok(self.opaque(env, &Type::Logic(kind)));
                };
                let ancestor = self.typing.type_of(arg.id())?;
                if !matches!(ancestor, Type::ClassSingleton { .. }) {
                    return Ok(Evaluation::predicate(env.clone(), env.clone(), BTreeSet::new()));
                }
                let ty = self.typing.type_of(receiver.id())?;
                let matched = self.select_descendants(ty, ancestor);
                Ok(self.refine_node_type(env, receiver, &matched, ty))
            }
            LogicKind::Base => {
                let ty = Type::Logic(kind);
                let (truthy, falsy) = self.subtyping.partition_union(&ty);
                Ok(Evaluation {
                    truthy_type: truthy,
                    falsy_type: falsy,
                    ..Evaluation::unchanged(env, Type::Bot)
                })
            }
        }
    }

    /// Members of `ty` that can be a subclass of `ancestor`; a broader member narrows to it.
    fn select_descendants(&self, ty: &Type, ancestor: &Type) -> Type {
        match self.expand(ty) {
            Type::Union(members) => Type::union(
                members
                    .iter()
                    .map(|member| self.select_descendants(member, ancestor)),
            ),
            member if self.subtyping.is_subtype(&member, ancestor) => member,
            member if self.subtyping.is_subtype(ancestor, &member) => ancestor.clone(),
            _ => Type::Bot,
        }
    }

    /// Applies per-branch types to whatever environment entry `node` denotes.
    fn refine_node_type(&self, env: &TypeEnv, node: &Node, truthy: &Type, falsy: &Type) -> Evaluation {
        let mut changed = BTreeSet::new();
        let truthy_env = self.narrow(env, node, truthy, &mut changed);
        let falsy_env = self.narrow(env, node, falsy, &mut changed);
        trace!(node = node.id(), %truthy, %falsy, "refined node type");
        Evaluation::predicate(truthy_env, falsy_env, changed)
    }

    fn narrow(&self, env: &TypeEnv, node: &Node, ty: &Type, changed: &mut BTreeSet<EnvKey>) -> TypeEnv {
        match node {
            Node::Var { name, .. } => {
                let key = EnvKey::Var(name.clone());
                let env = env.refine(&key, ty.clone());
                changed.insert(key);
                env
            }
            Node::Assign { name, value, .. } => {
                let key = EnvKey::Var(name.clone());
                let env = env.refine(&key, ty.clone());
                changed.insert(key);
                self.narrow(&env, value, ty, changed)
            }
            Node::Call { id, .. } if env.pure_call(*id).is_some() => {
                let key = EnvKey::Call(*id);
                let env = env.refine(&key, ty.clone());
                changed.insert(key);
                env
            }
            Node::Begin { body, .. } => match body.last() {
                Some(last) => self.narrow(env, last, ty, changed),
                None => env.clone(),
            },
            _ => env.clone(),
        }
    }

    /// Splits the environment across the clauses of a `case` expression.
    pub fn eval_case(&self, env: &TypeEnv, node: &Node) -> Result<CaseNarrowing, LogicError> {
        let Node::Case {
            scrutinee, whens, ..
        } = node
        else {
            return Ok(CaseNarrowing {
                clauses: Vec::new(),
                else_env: env.clone(),
            });
        };
        let Some(scrutinee) = scrutinee else {
            return Ok(CaseNarrowing {
                clauses: vec![env.clone(); whens.len()],
                else_env: env.clone(),
            });
        };

        let mut remaining = self.typing.type_of(scrutinee.id())?.clone();
        let mut clauses = Vec::with_capacity(whens.len());
        for WhenClause { patterns, .. } in whens {
            let mut matched = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let (hit, rest) = self.select_pattern(&remaining, pattern);
                matched.push(hit);
                remaining = rest;
            }
            let mut changed = BTreeSet::new();
            clauses.push(self.narrow(env, scrutinee, &Type::union(matched), &mut changed));
        }
        let mut changed = BTreeSet::new();
        let else_env = self.narrow(env, scrutinee, &remaining, &mut changed);
        Ok(CaseNarrowing { clauses, else_env })
    }

    fn select_pattern(&self, remaining: &Type, pattern: &Node) -> (Type, Type) {
        match pattern {
            Node::Const { name, .. } => self.type_case_select(remaining, name),
            Node::Literal { value, .. } => (
                literal_select(self.subtyping, remaining, value),
                remaining.clone(),
            ),
            _ => (remaining.clone(), remaining.clone()),
        }
    }
}

fn singleton_name(ty: &Type) -> Option<TypeName> {
    match ty {
        Type::ClassSingleton { name } => Some(name.clone()),
        _ => None,
    }
}
