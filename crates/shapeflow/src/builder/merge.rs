use std::collections::BTreeSet;

use tracing::debug;

use super::Builder;
use crate::method_type::{MethodDecl, MethodType};
use crate::shape::{Entry, Shape};
use crate::types::Type;

impl Builder<'_> {
    /// Methods every disjunct supports. An entry is private when any disjunct's is; a
    /// method whose overloads cannot be merged is dropped.
    pub(super) fn union_shape(&self, ty: &Type, shapes: Vec<Shape>) -> Shape {
        let mut shape = Shape::new(ty.clone());
        let Some((first, rest)) = shapes.split_first() else {
            return shape;
        };

        for name in first.methods.keys() {
            let mut entries = vec![&first.methods[name]];
            for other in rest {
                match other.methods.get(name) {
                    Some(entry) => entries.push(entry),
                    None => break,
                }
            }
            if entries.len() != shapes.len() {
                continue;
            }

            let private = entries.iter().any(|entry| entry.private);
            let mut merged = Some(entries[0].method_types.clone());
            for entry in &entries[1..] {
                merged = merged.and_then(|types| self.merge_overloads(types, &entry.method_types));
            }
            match merged {
                Some(method_types) => {
                    shape
                        .methods
                        .insert(name.clone(), Entry::new(method_types, private));
                }
                None => debug!(%ty, method = %name, "no common overload; method dropped from union"),
            }
        }
        shape
    }

    fn merge_overloads(&self, left: Vec<MethodType>, right: &[MethodType]) -> Option<Vec<MethodType>> {
        if left.as_slice() == right {
            let decls_left: Vec<_> = left.iter().map(|ty| &ty.decls).collect();
            let decls_right: Vec<_> = right.iter().map(|ty| &ty.decls).collect();
            if decls_left == decls_right || pooled(&left) == pooled(right) {
                return Some(left);
            }
        }

        let mut merged: Vec<MethodType> = Vec::new();
        for a in &left {
            for b in right {
                let candidate = if a == b {
                    let decls = a.decls.union(&b.decls).cloned().collect();
                    Some(a.clone().with_decls(decls))
                } else {
                    self.subtyping.merge_method_types(a, b)
                };
                if let Some(candidate) = candidate {
                    if !merged.contains(&candidate) {
                        merged.push(candidate);
                    }
                }
            }
        }
        (!merged.is_empty()).then_some(merged)
    }
}

fn pooled(types: &[MethodType]) -> BTreeSet<MethodDecl> {
    types
        .iter()
        .flat_map(|ty| ty.decls.iter().cloned())
        .collect()
}

/// Every conjunct's methods, later entries winning, except that a private entry never
/// replaces a public one.
pub(super) fn intersection_shape(ty: &Type, shapes: Vec<Shape>) -> Shape {
    let mut shape = Shape::new(ty.clone());
    for conjunct in shapes {
        for (name, entry) in conjunct.methods {
            let keep_existing = shape
                .methods
                .get(&name)
                .is_some_and(|existing| existing.is_public() && entry.private);
            if !keep_existing {
                shape.methods.insert(name, entry);
            }
        }
    }
    shape
}
