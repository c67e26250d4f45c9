use std::collections::BTreeMap;

use crate::method_type::{Block, Function, MethodType, Params, TypeParam};
use crate::shape::{Entry, Shape};
use crate::types::{builtin, Literal, ProcType, Type, TypeName};

fn overload(params: Vec<Type>, return_type: Type) -> MethodType {
    MethodType::new(Vec::new(), Function::new(Params::build(params), return_type), None)
}

/// `fetch` overloads for one key: plain, with a default value, and with a default block
/// receiving `missing_key`.
fn fetch_overloads(key: &Type, value: &Type, missing_key: &Type) -> [MethodType; 3] {
    let default = Type::var("T");
    let with_default = Type::union([value.clone(), default.clone()]);
    [
        overload(vec![key.clone()], value.clone()),
        MethodType::new(
            vec![TypeParam::new("T")],
            Function::new(
                Params::build(vec![key.clone(), default.clone()]),
                with_default.clone(),
            ),
            None,
        ),
        MethodType::new(
            vec![TypeParam::new("T")],
            Function::new(Params::build(vec![key.clone()]), with_default),
            Some(Block {
                function: Function::new(Params::build(vec![missing_key.clone()]), default),
                optional: false,
                self_type: None,
            }),
        ),
    ]
}

/// Prepends `specific` to the base shape's overloads of `name`.
fn prepend(base: &Shape, name: &str, specific: Vec<MethodType>) -> Entry {
    let inherited = base
        .get(name)
        .map(|entry| entry.method_types.clone())
        .unwrap_or_default();
    Entry::public(specific.into_iter().chain(inherited).collect())
}

/// Array shape refined with per-index overloads of `[]`, `[]=`, `fetch`, `first` and `last`.
pub(super) fn tuple_shape(ty: &Type, items: &[Type], array_shape: Shape) -> Shape {
    let index = |i: usize| Type::Literal(Literal::Integer(i as i64));
    let integer = Type::instance(TypeName::new(builtin::INTEGER), Vec::new());

    let aref = items
        .iter()
        .enumerate()
        .map(|(i, item)| overload(vec![index(i)], item.clone()))
        .collect();
    let aset = items
        .iter()
        .enumerate()
        .map(|(i, item)| overload(vec![index(i), item.clone()], item.clone()))
        .collect();
    let fetch = items
        .iter()
        .enumerate()
        .flat_map(|(i, item)| fetch_overloads(&index(i), item, &integer))
        .collect();
    let first = items.first().cloned().unwrap_or(Type::Nil);
    let last = items.last().cloned().unwrap_or(Type::Nil);

    let mut shape = array_shape.clone().update(ty.clone());
    shape.methods.insert("[]".to_string(), prepend(&array_shape, "[]", aref));
    shape.methods.insert("[]=".to_string(), prepend(&array_shape, "[]=", aset));
    shape.methods.insert("fetch".to_string(), prepend(&array_shape, "fetch", fetch));
    shape
        .methods
        .insert("first".to_string(), Entry::public(vec![overload(Vec::new(), first)]));
    shape
        .methods
        .insert("last".to_string(), Entry::public(vec![overload(Vec::new(), last)]));
    shape
}

/// Hash shape refined with per-key overloads of `[]`, `[]=` and `fetch`.
pub(super) fn record_shape(ty: &Type, fields: &BTreeMap<Literal, Type>, hash_shape: Shape) -> Shape {
    let all_keys = Type::union(fields.keys().cloned().map(Type::Literal));

    let aref = fields
        .iter()
        .map(|(key, value)| overload(vec![Type::Literal(key.clone())], value.clone()))
        .collect();
    let aset = fields
        .iter()
        .map(|(key, value)| {
            overload(vec![Type::Literal(key.clone()), value.clone()], value.clone())
        })
        .collect();
    let fetch = fields
        .iter()
        .flat_map(|(key, value)| fetch_overloads(&Type::Literal(key.clone()), value, &all_keys))
        .collect();

    let mut shape = hash_shape.clone().update(ty.clone());
    shape.methods.insert("[]".to_string(), prepend(&hash_shape, "[]", aref));
    shape.methods.insert("[]=".to_string(), prepend(&hash_shape, "[]=", aset));
    shape.methods.insert("fetch".to_string(), prepend(&hash_shape, "fetch", fetch));
    shape
}

/// Proc shape whose `[]` and `call` take exactly the proc's own signature.
pub(super) fn proc_shape(ty: &Type, proc_type: &ProcType, base: Shape) -> Shape {
    let call = Entry::public(vec![MethodType::new(
        Vec::new(),
        proc_type.function.clone(),
        proc_type.block.clone(),
    )]);
    let mut shape = base.update(ty.clone());
    shape.methods.insert("[]".to_string(), call.clone());
    shape.methods.insert("call".to_string(), call);
    shape
}
