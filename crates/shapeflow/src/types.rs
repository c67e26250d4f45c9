use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::method_type::{Block, Function};

/// Absolute name of a class, module, interface or alias declaration (`::Foo::Bar`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        if name.starts_with("::") {
            Self(name.to_string())
        } else {
            Self(format!("::{name}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn last_segment(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or_default()
    }

    pub fn is_interface(&self) -> bool {
        self.last_segment().starts_with('_')
    }

    pub fn is_alias(&self) -> bool {
        self.last_segment()
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Names of the core classes the builder and the interpreter refer to directly.
pub mod builtin {
    pub const BASIC_OBJECT: &str = "::BasicObject";
    pub const OBJECT: &str = "::Object";
    pub const KERNEL: &str = "::Kernel";
    pub const MODULE: &str = "::Module";
    pub const CLASS: &str = "::Class";
    pub const STRING: &str = "::String";
    pub const INTEGER: &str = "::Integer";
    pub const SYMBOL: &str = "::Symbol";
    pub const TRUE_CLASS: &str = "::TrueClass";
    pub const FALSE_CLASS: &str = "::FalseClass";
    pub const NIL_CLASS: &str = "::NilClass";
    pub const ARRAY: &str = "::Array";
    pub const HASH: &str = "::Hash";
    pub const PROC: &str = "::Proc";
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Literal {
    Integer(i64),
    String(String),
    Symbol(String),
    Bool(bool),
}

impl Literal {
    /// The nominal class whose instances the literal denotes.
    pub fn back_type_name(&self) -> TypeName {
        TypeName::new(match self {
            Literal::Integer(_) => builtin::INTEGER,
            Literal::String(_) => builtin::STRING,
            Literal::Symbol(_) => builtin::SYMBOL,
            Literal::Bool(true) => builtin::TRUE_CLASS,
            Literal::Bool(false) => builtin::FALSE_CLASS,
        })
    }

    pub fn back_type(&self) -> Type {
        Type::instance(self.back_type_name(), Vec::new())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{value}"),
            Literal::String(value) => write!(f, "{value:?}"),
            Literal::Symbol(value) => {
                if is_plain_identifier(value) {
                    write!(f, ":{value}")
                } else {
                    write!(f, ":{value:?}")
                }
            }
            Literal::Bool(value) => write!(f, "{value}"),
        }
    }
}

fn is_plain_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Return-type tags attached to built-in predicates; they tell the interpreter how a call
/// narrows its receiver or argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicKind {
    ReceiverIsArg,
    ReceiverIsNil,
    ReceiverIsNotNil,
    ArgIsReceiver,
    ArgEqualsReceiver,
    ArgIsAncestor,
    Not,
    Base,
}

impl fmt::Display for LogicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicKind::ReceiverIsArg => "receiver_is_arg",
            LogicKind::ReceiverIsNil => "receiver_is_nil",
            LogicKind::ReceiverIsNotNil => "receiver_is_not_nil",
            LogicKind::ArgIsReceiver => "arg_is_receiver",
            LogicKind::ArgEqualsReceiver => "arg_equals_receiver",
            LogicKind::ArgIsAncestor => "arg_is_ancestor",
            LogicKind::Not => "not",
            LogicKind::Base => "base",
        };
        write!(f, "logic({name})")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProcType {
    pub function: Function,
    pub block: Option<Block>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    SelfType,
    Instance,
    Class,
    Any,
    Top,
    Bot,
    Void,
    Nil,
    Boolean,
    ClassInstance { name: TypeName, args: Vec<Type> },
    ClassSingleton { name: TypeName },
    Interface { name: TypeName, args: Vec<Type> },
    Alias { name: TypeName, args: Vec<Type> },
    Union(Members),
    Intersection(Members),
    Literal(Literal),
    Tuple(Vec<Type>),
    Record(BTreeMap<Literal, Type>),
    Proc(Box<ProcType>),
    Var(String),
    Logic(LogicKind),
}

/// Distinct members of a union or intersection, kept in first-occurrence order for printing.
/// Equality and hashing ignore that order.
#[derive(Clone, Debug, Eq)]
pub struct Members(Vec<Type>);

impl Members {
    pub fn new(types: impl IntoIterator<Item = Type>) -> Self {
        let mut members = Vec::new();
        for ty in types {
            push_unique(&mut members, ty);
        }
        Self(members)
    }
}

impl Deref for Members {
    type Target = [Type];

    fn deref(&self) -> &[Type] {
        &self.0
    }
}

impl PartialEq for Members {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|ty| other.0.contains(ty))
    }
}

impl Hash for Members {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let sum = self.0.iter().fold(0u64, |sum, ty| {
            let mut hasher = DefaultHasher::new();
            ty.hash(&mut hasher);
            sum.wrapping_add(hasher.finish())
        });
        state.write_usize(self.0.len());
        state.write_u64(sum);
    }
}

impl IntoIterator for Members {
    type Item = Type;
    type IntoIter = std::vec::IntoIter<Type>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Members {
    type Item = &'a Type;
    type IntoIter = std::slice::Iter<'a, Type>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Free occurrences that make a type context-relative.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FreeVar {
    SelfType,
    Instance,
    Class,
    Var(String),
}

impl Type {
    pub fn instance(name: TypeName, args: Vec<Type>) -> Self {
        Type::ClassInstance { name, args }
    }

    pub fn singleton(name: TypeName) -> Self {
        Type::ClassSingleton { name }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Type::Var(name.into())
    }

    pub fn optional(ty: Type) -> Self {
        Type::union([ty, Type::Nil])
    }

    pub fn true_type() -> Self {
        Type::Literal(Literal::Bool(true))
    }

    pub fn false_type() -> Self {
        Type::Literal(Literal::Bool(false))
    }

    /// Normal-form union: flattened, deduplicated in first-occurrence order, `bot` dropped,
    /// absorbed by `untyped`.
    pub fn union(types: impl IntoIterator<Item = Type>) -> Self {
        let mut members: Vec<Type> = Vec::new();
        for ty in types {
            match ty {
                Type::Union(inner) => {
                    for member in inner {
                        push_unique(&mut members, member);
                    }
                }
                Type::Bot => {}
                other => push_unique(&mut members, other),
            }
        }
        if members.iter().any(|ty| matches!(ty, Type::Any)) {
            return Type::Any;
        }
        match members.len() {
            0 => Type::Bot,
            1 => members.remove(0),
            _ => Type::Union(Members(members)),
        }
    }

    pub fn intersection(types: impl IntoIterator<Item = Type>) -> Self {
        let mut members: Vec<Type> = Vec::new();
        for ty in types {
            match ty {
                Type::Intersection(inner) => {
                    for member in inner {
                        push_unique(&mut members, member);
                    }
                }
                Type::Top => {}
                other => push_unique(&mut members, other),
            }
        }
        match members.len() {
            0 => Type::Top,
            1 => members.remove(0),
            _ => Type::Intersection(Members(members)),
        }
    }

    pub fn free_variables(&self) -> BTreeSet<FreeVar> {
        let mut out = BTreeSet::new();
        self.collect_free_variables(&mut out);
        out
    }

    pub(crate) fn collect_free_variables(&self, out: &mut BTreeSet<FreeVar>) {
        match self {
            Type::SelfType => {
                out.insert(FreeVar::SelfType);
            }
            Type::Instance => {
                out.insert(FreeVar::Instance);
            }
            Type::Class => {
                out.insert(FreeVar::Class);
            }
            Type::Var(name) => {
                out.insert(FreeVar::Var(name.clone()));
            }
            Type::ClassInstance { args, .. }
            | Type::Interface { args, .. }
            | Type::Alias { args, .. } => {
                for arg in args {
                    arg.collect_free_variables(out);
                }
            }
            Type::Union(types) | Type::Intersection(types) => {
                for ty in types {
                    ty.collect_free_variables(out);
                }
            }
            Type::Tuple(types) => {
                for ty in types {
                    ty.collect_free_variables(out);
                }
            }
            Type::Record(fields) => {
                for ty in fields.values() {
                    ty.collect_free_variables(out);
                }
            }
            Type::Proc(proc_type) => {
                proc_type.function.collect_free_variables(out);
                if let Some(block) = &proc_type.block {
                    block.collect_free_variables(out);
                }
            }
            Type::Any
            | Type::Top
            | Type::Bot
            | Type::Void
            | Type::Nil
            | Type::Boolean
            | Type::ClassSingleton { .. }
            | Type::Literal(_)
            | Type::Logic(_) => {}
        }
    }

    /// True when the tree mentions `self`, `instance` or `class` anywhere.
    pub fn mentions_placeholder(&self) -> bool {
        self.free_variables()
            .iter()
            .any(|var| !matches!(var, FreeVar::Var(_)))
    }
}

fn push_unique(members: &mut Vec<Type>, ty: Type) {
    if !members.contains(&ty) {
        members.push(ty);
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::SelfType => f.write_str("self"),
            Type::Instance => f.write_str("instance"),
            Type::Class => f.write_str("class"),
            Type::Any => f.write_str("untyped"),
            Type::Top => f.write_str("top"),
            Type::Bot => f.write_str("bot"),
            Type::Void => f.write_str("void"),
            Type::Nil => f.write_str("nil"),
            Type::Boolean => f.write_str("bool"),
            Type::ClassInstance { name, args }
            | Type::Interface { name, args }
            | Type::Alias { name, args } => {
                write!(f, "{name}")?;
                write_args(f, args)
            }
            Type::ClassSingleton { name } => write!(f, "singleton({name})"),
            Type::Union(types) => write_joined(f, types, " | ", |ty| {
                matches!(ty, Type::Intersection(_) | Type::Proc(_))
            }),
            Type::Intersection(types) => write_joined(f, types, " & ", |ty| {
                matches!(ty, Type::Union(_) | Type::Proc(_))
            }),
            Type::Literal(literal) => write!(f, "{literal}"),
            Type::Tuple(types) => {
                f.write_str("[")?;
                write_joined(f, types, ", ", |_| false)?;
                f.write_str("]")
            }
            Type::Record(fields) => {
                f.write_str("{ ")?;
                for (index, (key, ty)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    match key {
                        Literal::Symbol(name) if is_plain_identifier(name) => {
                            write!(f, "{name}: {ty}")?
                        }
                        other => write!(f, "{other} => {ty}")?,
                    }
                }
                f.write_str(" }")
            }
            Type::Proc(proc_type) => {
                write!(f, "^{}", proc_type.function.params)?;
                if let Some(block) = &proc_type.block {
                    write!(f, " {block}")?;
                }
                write!(f, " -> {}", proc_type.function.return_type)
            }
            Type::Var(name) => f.write_str(name),
            Type::Logic(kind) => write!(f, "{kind}"),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Type]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    f.write_str("[")?;
    write_joined(f, args, ", ", |_| false)?;
    f.write_str("]")
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    types: &[Type],
    separator: &str,
    needs_parens: impl Fn(&Type) -> bool,
) -> fmt::Result {
    for (index, ty) in types.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        if needs_parens(ty) {
            write!(f, "({ty})")?;
        } else {
            write!(f, "{ty}")?;
        }
    }
    Ok(())
}
