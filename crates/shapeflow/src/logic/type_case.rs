use tracing::trace;

use crate::subtyping::Subtyping;
use crate::types::{Literal, Type, TypeName};

/// Splits `ty` into the part that is an instance of `name` and the part that may not be.
///
/// A broader type keeps its unmatched side intact, since values of other classes may still
/// inhabit it. When nothing inside an alias matches, the alias stays unexpanded.
pub fn type_case_select(subtyping: &dyn Subtyping, ty: &Type, name: &TypeName) -> (Type, Type) {
    let (matched, unmatched) = select(subtyping, ty, name);
    trace!(%ty, %name, %matched, %unmatched, "type case select");
    (matched, unmatched)
}

fn select(subtyping: &dyn Subtyping, ty: &Type, name: &TypeName) -> (Type, Type) {
    match ty {
        Type::Union(members) => {
            let (matched, unmatched): (Vec<Type>, Vec<Type>) = members
                .iter()
                .map(|member| select(subtyping, member, name))
                .unzip();
            (Type::union(matched), Type::union(unmatched))
        }
        Type::Alias { .. } => match subtyping.expand_alias(ty) {
            Some(expanded) => {
                let (matched, unmatched) = select(subtyping, &expanded, name);
                if matched == Type::Bot {
                    (Type::Bot, ty.clone())
                } else {
                    (matched, unmatched)
                }
            }
            None => (Type::Bot, ty.clone()),
        },
        Type::Any | Type::Top => (subtyping.instance_type(name), ty.clone()),
        Type::Bot => (Type::Bot, Type::Bot),
        _ => {
            let target = subtyping.instance_type(name);
            if subtyping.is_subtype(ty, &target) {
                (ty.clone(), Type::Bot)
            } else if subtyping.is_subtype(&target, ty) {
                (target, ty.clone())
            } else {
                (Type::Bot, ty.clone())
            }
        }
    }
}

/// The part of `ty` that can equal `literal`.
pub(super) fn literal_select(subtyping: &dyn Subtyping, ty: &Type, literal: &Literal) -> Type {
    let literal_type = Type::Literal(literal.clone());
    match ty {
        Type::Union(members) => Type::union(
            members
                .iter()
                .map(|member| literal_select(subtyping, member, literal)),
        ),
        Type::Alias { .. } => match subtyping.expand_alias(ty) {
            Some(expanded) => literal_select(subtyping, &expanded, literal),
            None => Type::Bot,
        },
        Type::Any | Type::Top => literal_type,
        _ if subtyping.is_subtype(&literal_type, ty) => literal_type,
        _ => Type::Bot,
    }
}
