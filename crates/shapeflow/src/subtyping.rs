use tracing::trace;

use crate::definitions::Definitions;
use crate::method_type::{Function, MethodType};
use crate::substitution::{Anchors, Substitution};
use crate::types::{builtin, Literal, Type, TypeName};

/// Alias expansions deeper than this are treated as malformed input.
const MAX_ALIAS_DEPTH: usize = 64;

/// The subtyping relation and the signature merge the shape builder and the interpreter
/// consume.
pub trait Subtyping {
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool;

    /// Merges two overloads into one that accepts either argument list, if possible.
    fn merge_method_types(&self, a: &MethodType, b: &MethodType) -> Option<MethodType>;

    /// One-level expansion of an alias application; `None` for anything else.
    fn expand_alias(&self, ty: &Type) -> Option<Type>;

    /// The nominal type of `name` with every type parameter set to `untyped`.
    fn instance_type(&self, name: &TypeName) -> Type;

    /// Splits a type into the part that can be truthy and the part that can be falsy
    /// (`nil` or `false`).
    fn partition_union(&self, ty: &Type) -> (Type, Type) {
        partition(self, ty, MAX_ALIAS_DEPTH, &|member| is_falsy(member))
    }

    /// Splits a type into its `nil` part and the rest.
    fn partition_nil(&self, ty: &Type) -> (Type, Type) {
        let (non_nil, nil) = partition(self, ty, MAX_ALIAS_DEPTH, &|member| is_nil(member));
        (nil, non_nil)
    }
}

enum Verdict {
    Left,
    Right,
    Both,
}

fn is_falsy(ty: &Type) -> Verdict {
    match ty {
        Type::Nil | Type::Literal(Literal::Bool(false)) => Verdict::Right,
        Type::ClassInstance { name, .. }
            if name.as_str() == builtin::NIL_CLASS || name.as_str() == builtin::FALSE_CLASS =>
        {
            Verdict::Right
        }
        Type::Any | Type::Top | Type::Void | Type::Var(_) | Type::Intersection(_) => Verdict::Both,
        _ => Verdict::Left,
    }
}

fn is_nil(ty: &Type) -> Verdict {
    match ty {
        Type::Nil => Verdict::Right,
        Type::ClassInstance { name, .. } if name.as_str() == builtin::NIL_CLASS => Verdict::Right,
        Type::Any | Type::Top | Type::Void | Type::Var(_) | Type::Intersection(_) => Verdict::Both,
        _ => Verdict::Left,
    }
}

/// Returns `(left, right)` where `right` collects the members the classifier picks out.
fn partition<S: Subtyping + ?Sized>(
    oracle: &S,
    ty: &Type,
    depth: usize,
    classify: &dyn Fn(&Type) -> Verdict,
) -> (Type, Type) {
    match ty {
        Type::Union(members) => {
            let mut left = Vec::new();
            let mut right = Vec::new();
            for member in members {
                let (l, r) = partition(oracle, member, depth, classify);
                left.push(l);
                right.push(r);
            }
            (Type::union(left), Type::union(right))
        }
        Type::Alias { .. } if depth > 0 => match oracle.expand_alias(ty) {
            Some(expanded) => partition(oracle, &expanded, depth - 1, classify),
            None => (ty.clone(), ty.clone()),
        },
        Type::Boolean | Type::Logic(_) => {
            let (lt, rt) = partition(oracle, &Type::true_type(), depth, classify);
            let (lf, rf) = partition(oracle, &Type::false_type(), depth, classify);
            let left = Type::union([lt, lf]);
            let right = Type::union([rt, rf]);
            let bool_if_both = |side: Type| match side {
                Type::Union(ref members) if members.len() == 2 => Type::Boolean,
                other => other,
            };
            (bool_if_both(left), bool_if_both(right))
        }
        other => match classify(other) {
            Verdict::Left => (other.clone(), Type::Bot),
            Verdict::Right => (Type::Bot, other.clone()),
            Verdict::Both => (other.clone(), other.clone()),
        },
    }
}

/// Nominal subtyping over a declaration environment.
///
/// Generic arguments are compared invariantly; `untyped` on either side matches anything.
/// Interfaces are related only through declared ancestry, not structurally.
pub struct NominalSubtyping<'a> {
    definitions: &'a dyn Definitions,
}

impl<'a> NominalSubtyping<'a> {
    pub fn new(definitions: &'a dyn Definitions) -> Self {
        Self { definitions }
    }

    fn check(&self, sub: &Type, sup: &Type, depth: usize) -> bool {
        if sub == sup {
            return true;
        }
        if depth == 0 {
            return false;
        }
        let depth = depth - 1;
        match (sub, sup) {
            (_, Type::Any | Type::Top | Type::Void) => true,
            (Type::Any | Type::Bot, _) => true,
            (Type::Alias { .. }, _) => self
                .expand_alias(sub)
                .is_some_and(|expanded| self.check(&expanded, sup, depth)),
            (_, Type::Alias { .. }) => self
                .expand_alias(sup)
                .is_some_and(|expanded| self.check(sub, &expanded, depth)),
            (Type::Union(members), _) => members.iter().all(|ty| self.check(ty, sup, depth)),
            (_, Type::Intersection(members)) => {
                members.iter().all(|ty| self.check(sub, ty, depth))
            }
            (_, Type::Union(members)) => members.iter().any(|ty| self.check(sub, ty, depth)),
            (Type::Intersection(members), _) => {
                members.iter().any(|ty| self.check(ty, sup, depth))
            }
            (Type::Logic(_), _) => self.check(&Type::Boolean, sup, depth),
            (_, Type::Boolean) => match sub {
                Type::Literal(Literal::Bool(_)) => true,
                Type::ClassInstance { name, .. } => {
                    name.as_str() == builtin::TRUE_CLASS || name.as_str() == builtin::FALSE_CLASS
                }
                _ => false,
            },
            (Type::Boolean, _) => {
                self.check(&Type::true_type(), sup, depth)
                    && self.check(&Type::false_type(), sup, depth)
            }
            (_, Type::Nil) => matches!(
                sub,
                Type::ClassInstance { name, .. } if name.as_str() == builtin::NIL_CLASS
            ),
            (Type::Nil, _) => self.check(&builtin_instance(builtin::NIL_CLASS), sup, depth),
            (Type::Literal(_), Type::Literal(_)) => false,
            (Type::Literal(literal), _) => self.check(&literal.back_type(), sup, depth),
            (Type::Tuple(a), Type::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.check(x, y, depth))
            }
            (Type::Tuple(items), _) => {
                let array = Type::instance(
                    TypeName::new(builtin::ARRAY),
                    vec![Type::union(items.iter().cloned())],
                );
                self.check(&array, sup, depth)
            }
            (Type::Record(a), Type::Record(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, ty)| {
                        b.get(key).is_some_and(|other| self.check(ty, other, depth))
                    })
            }
            (Type::Record(fields), _) => {
                let hash = Type::instance(
                    TypeName::new(builtin::HASH),
                    vec![
                        Type::union(fields.keys().cloned().map(Type::Literal)),
                        Type::union(fields.values().cloned()),
                    ],
                );
                self.check(&hash, sup, depth)
            }
            (Type::Proc(_), _) => self.check(&builtin_instance(builtin::PROC), sup, depth),
            (
                Type::ClassInstance { name, args } | Type::Interface { name, args },
                Type::ClassInstance {
                    name: target,
                    args: target_args,
                }
                | Type::Interface {
                    name: target,
                    args: target_args,
                },
            ) => self.nominal(name, args, target, target_args),
            (Type::ClassSingleton { name }, Type::ClassSingleton { name: target }) => {
                !self.definitions.is_module(target)
                    && self.ancestor_names(name).iter().any(|ancestor| ancestor == target)
            }
            (Type::ClassSingleton { name }, _) => {
                let meta = if self.definitions.is_module(name) {
                    builtin::MODULE
                } else {
                    builtin::CLASS
                };
                self.check(&builtin_instance(meta), sup, depth)
            }
            _ => false,
        }
    }

    fn ancestor_names(&self, name: &TypeName) -> Vec<TypeName> {
        self.definitions
            .ancestors(name)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|ancestor| match ancestor {
                Type::ClassInstance { name, .. } | Type::Interface { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    fn nominal(&self, name: &TypeName, args: &[Type], target: &TypeName, target_args: &[Type]) -> bool {
        let Ok(ancestors) = self.definitions.ancestors(name) else {
            return false;
        };
        let Some(ancestor) = ancestors.into_iter().find(|ancestor| match ancestor {
            Type::ClassInstance { name, .. } | Type::Interface { name, .. } => name == target,
            _ => false,
        }) else {
            return false;
        };
        if target_args.is_empty() {
            return true;
        }
        let params = self.definitions.type_params(name).unwrap_or_default();
        let names: Vec<String> = params.into_iter().map(|param| param.name).collect();
        let values: Vec<Type> = if args.is_empty() {
            vec![Type::Any; names.len()]
        } else {
            args.to_vec()
        };
        let Ok(subst) = Substitution::build(&names, &values, Anchors::default()) else {
            return false;
        };
        let ancestor_args = match subst.apply(&ancestor) {
            Type::ClassInstance { args, .. } | Type::Interface { args, .. } => args,
            _ => return false,
        };
        ancestor_args.len() == target_args.len()
            && ancestor_args
                .iter()
                .zip(target_args)
                .all(|(a, b)| a == b || matches!(a, Type::Any) || matches!(b, Type::Any))
    }
}

fn builtin_instance(name: &str) -> Type {
    Type::instance(TypeName::new(name), Vec::new())
}

impl Subtyping for NominalSubtyping<'_> {
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        let result = self.check(sub, sup, MAX_ALIAS_DEPTH);
        trace!(%sub, %sup, result, "subtype check");
        result
    }

    fn merge_method_types(&self, a: &MethodType, b: &MethodType) -> Option<MethodType> {
        let decls = a.decls.union(&b.decls).cloned().collect();
        if a == b {
            return Some(a.clone().with_decls(decls));
        }
        if a.type_params != b.type_params
            || a.block != b.block
            || !a.function.params.same_layout(&b.function.params)
        {
            return None;
        }
        let params = a.function.params.zip_with(&b.function.params, |x, y| {
            if x == y {
                x.clone()
            } else {
                Type::intersection([x.clone(), y.clone()])
            }
        });
        let return_type = Type::union([a.return_type().clone(), b.return_type().clone()]);
        let mut merged = MethodType::new(
            a.type_params.clone(),
            Function::new(params, return_type),
            a.block.clone(),
        );
        merged.decls = decls;
        Some(merged)
    }

    fn expand_alias(&self, ty: &Type) -> Option<Type> {
        match ty {
            Type::Alias { name, args } => self.definitions.expand_alias(name, args).ok(),
            _ => None,
        }
    }

    fn instance_type(&self, name: &TypeName) -> Type {
        let arity = self
            .definitions
            .type_params(name)
            .map(|params| params.len())
            .unwrap_or_default();
        let args = vec![Type::Any; arity];
        if name.is_interface() {
            Type::Interface {
                name: name.clone(),
                args,
            }
        } else {
            Type::instance(name.clone(), args)
        }
    }
}
