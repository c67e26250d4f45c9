use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::{FreeVar, Type, TypeName};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variance {
    #[default]
    Invariant,
    Covariant,
    Contravariant,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParam {
    pub name: String,
    pub upper_bound: Option<Type>,
    pub variance: Variance,
    pub unchecked: bool,
}

impl TypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upper_bound: None,
            variance: Variance::Invariant,
            unchecked: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Params {
    pub required: Vec<Type>,
    pub optional: Vec<Type>,
    pub rest: Option<Type>,
    pub required_keywords: BTreeMap<String, Type>,
    pub optional_keywords: BTreeMap<String, Type>,
    pub rest_keywords: Option<Type>,
}

impl Params {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(required: Vec<Type>) -> Self {
        Self {
            required,
            ..Self::default()
        }
    }

    pub fn map(&self, mut f: impl FnMut(&Type) -> Type) -> Self {
        Self {
            required: self.required.iter().map(&mut f).collect(),
            optional: self.optional.iter().map(&mut f).collect(),
            rest: self.rest.as_ref().map(&mut f),
            required_keywords: self
                .required_keywords
                .iter()
                .map(|(name, ty)| (name.clone(), f(ty)))
                .collect(),
            optional_keywords: self
                .optional_keywords
                .iter()
                .map(|(name, ty)| (name.clone(), f(ty)))
                .collect(),
            rest_keywords: self.rest_keywords.as_ref().map(&mut f),
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .chain(self.rest.iter())
            .chain(self.required_keywords.values())
            .chain(self.optional_keywords.values())
            .chain(self.rest_keywords.iter())
    }

    /// Same arity and keyword names, ignoring the parameter types.
    pub fn same_layout(&self, other: &Params) -> bool {
        self.required.len() == other.required.len()
            && self.optional.len() == other.optional.len()
            && self.rest.is_some() == other.rest.is_some()
            && self.required_keywords.keys().eq(other.required_keywords.keys())
            && self.optional_keywords.keys().eq(other.optional_keywords.keys())
            && self.rest_keywords.is_some() == other.rest_keywords.is_some()
    }

    /// Pairs the parameter types of two same-layout lists.
    pub fn zip_with(&self, other: &Params, mut f: impl FnMut(&Type, &Type) -> Type) -> Self {
        Self {
            required: zip_types(&self.required, &other.required, &mut f),
            optional: zip_types(&self.optional, &other.optional, &mut f),
            rest: zip_option(&self.rest, &other.rest, &mut f),
            required_keywords: zip_keywords(
                &self.required_keywords,
                &other.required_keywords,
                &mut f,
            ),
            optional_keywords: zip_keywords(
                &self.optional_keywords,
                &other.optional_keywords,
                &mut f,
            ),
            rest_keywords: zip_option(&self.rest_keywords, &other.rest_keywords, &mut f),
        }
    }
}

fn zip_types(a: &[Type], b: &[Type], f: &mut impl FnMut(&Type, &Type) -> Type) -> Vec<Type> {
    a.iter().zip(b.iter()).map(|(x, y)| f(x, y)).collect()
}

fn zip_option(
    a: &Option<Type>,
    b: &Option<Type>,
    f: &mut impl FnMut(&Type, &Type) -> Type,
) -> Option<Type> {
    match (a, b) {
        (Some(x), Some(y)) => Some(f(x, y)),
        _ => None,
    }
}

fn zip_keywords(
    a: &BTreeMap<String, Type>,
    b: &BTreeMap<String, Type>,
    f: &mut impl FnMut(&Type, &Type) -> Type,
) -> BTreeMap<String, Type> {
    a.iter()
        .zip(b.values())
        .map(|((name, x), y)| (name.clone(), f(x, y)))
        .collect()
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut items = Vec::new();
        items.extend(self.required.iter().map(|ty| ty.to_string()));
        items.extend(self.optional.iter().map(|ty| format!("?{ty}")));
        if let Some(rest) = &self.rest {
            items.push(format!("*{rest}"));
        }
        items.extend(
            self.required_keywords
                .iter()
                .map(|(name, ty)| format!("{name}: {ty}")),
        );
        items.extend(
            self.optional_keywords
                .iter()
                .map(|(name, ty)| format!("?{name}: {ty}")),
        );
        if let Some(rest) = &self.rest_keywords {
            items.push(format!("**{rest}"));
        }
        write!(f, "({})", items.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Function {
    pub params: Params,
    pub return_type: Type,
}

impl Function {
    pub fn new(params: Params, return_type: Type) -> Self {
        Self {
            params,
            return_type,
        }
    }

    pub fn with_return_type(&self, return_type: Type) -> Self {
        Self {
            params: self.params.clone(),
            return_type,
        }
    }

    pub(crate) fn collect_free_variables(&self, out: &mut BTreeSet<FreeVar>) {
        for ty in self.params.types() {
            ty.collect_free_variables(out);
        }
        self.return_type.collect_free_variables(out);
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.params, self.return_type)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub function: Function,
    pub optional: bool,
    pub self_type: Option<Type>,
}

impl Block {
    pub(crate) fn collect_free_variables(&self, out: &mut BTreeSet<FreeVar>) {
        self.function.collect_free_variables(out);
        if let Some(self_type) = &self.self_type {
            self_type.collect_free_variables(out);
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            f.write_str("?")?;
        }
        write!(f, "{{ {}", self.function.params)?;
        if let Some(self_type) = &self.self_type {
            write!(f, " [self: {self_type}]")?;
        }
        write!(f, " -> {} }}", self.function.return_type)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MethodName {
    Instance { type_name: TypeName, method: String },
    Singleton { type_name: TypeName, method: String },
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodName::Instance { type_name, method } => write!(f, "{type_name}#{method}"),
            MethodName::Singleton { type_name, method } => write!(f, "{type_name}.{method}"),
        }
    }
}

/// Provenance of an overload: which declared member it came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodDecl {
    pub method_name: MethodName,
    pub defined_in: TypeName,
}

/// One overload of a method.
///
/// `decls` records provenance only. It takes no part in equality or hashing: two
/// overloads with the same signature are the same overload, wherever they were declared.
#[derive(Clone, Debug)]
pub struct MethodType {
    pub type_params: Vec<TypeParam>,
    pub function: Function,
    pub block: Option<Block>,
    pub decls: BTreeSet<MethodDecl>,
}

impl MethodType {
    pub fn new(type_params: Vec<TypeParam>, function: Function, block: Option<Block>) -> Self {
        Self {
            type_params,
            function,
            block,
            decls: BTreeSet::new(),
        }
    }

    pub fn with_decls(mut self, decls: BTreeSet<MethodDecl>) -> Self {
        self.decls = decls;
        self
    }

    pub fn with_return_type(&self, return_type: Type) -> Self {
        Self {
            type_params: self.type_params.clone(),
            function: self.function.with_return_type(return_type),
            block: self.block.clone(),
            decls: self.decls.clone(),
        }
    }

    pub fn return_type(&self) -> &Type {
        &self.function.return_type
    }

    pub fn free_variables(&self) -> BTreeSet<FreeVar> {
        let mut out = BTreeSet::new();
        self.function.collect_free_variables(&mut out);
        if let Some(block) = &self.block {
            block.collect_free_variables(&mut out);
        }
        for param in &self.type_params {
            if let Some(bound) = &param.upper_bound {
                bound.collect_free_variables(&mut out);
            }
        }
        for param in &self.type_params {
            out.remove(&FreeVar::Var(param.name.clone()));
        }
        out
    }
}

impl PartialEq for MethodType {
    fn eq(&self, other: &Self) -> bool {
        self.type_params == other.type_params
            && self.function == other.function
            && self.block == other.block
    }
}

impl Eq for MethodType {}

impl Hash for MethodType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_params.hash(state);
        self.function.hash(state);
        self.block.hash(state);
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.type_params.is_empty() {
            let params: Vec<String> = self
                .type_params
                .iter()
                .map(|param| match &param.upper_bound {
                    Some(bound) => format!("{} < {bound}", param.name),
                    None => param.name.clone(),
                })
                .collect();
            write!(f, "[{}] ", params.join(", "))?;
        }
        write!(f, "{}", self.function.params)?;
        if let Some(block) = &self.block {
            write!(f, " {block}")?;
        }
        write!(f, " -> {}", self.function.return_type)
    }
}
