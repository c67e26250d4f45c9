use std::collections::BTreeMap;

use serde::Deserialize;

use crate::method_type::{MethodType, TypeParam};
use crate::syntax::SyntaxError;
use crate::types::{Type, TypeName};

mod table;

pub use self::table::{AliasDecl, DeclKind, DeclarationTable, MethodMember, ModuleDecl};

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("unknown type name: {0}")]
    UnknownType(TypeName),
    #[error("{name} is declared both as {first} and as {second}")]
    ConflictingDeclaration {
        name: TypeName,
        first: &'static str,
        second: &'static str,
    },
    #[error("invalid signature in {context}: {source}")]
    Syntax {
        context: String,
        #[source]
        source: SyntaxError,
    },
    #[error("failed to parse declarations: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which side of a declaration a member lives on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    #[default]
    Instance,
    Singleton,
    /// `module_function`: a singleton method plus a private instance method.
    SingletonInstance,
}

impl MemberKind {
    pub fn is_instance(self) -> bool {
        matches!(self, MemberKind::Instance | MemberKind::SingletonInstance)
    }

    pub fn is_singleton(self) -> bool {
        matches!(self, MemberKind::Singleton | MemberKind::SingletonInstance)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// One declared overload together with where it was declared.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub method_type: MethodType,
    pub defined_in: TypeName,
    pub implemented_in: Option<TypeName>,
    pub member_kind: MemberKind,
    /// Name of the declaring member; `initialize` for a derived `new`.
    pub member_name: String,
}

#[derive(Debug, Clone)]
pub struct MethodDefinition {
    pub visibility: Visibility,
    pub defs: Vec<TypeDef>,
}

impl MethodDefinition {
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }
}

/// Resolved method table of one side (instance, singleton or interface) of a declaration.
#[derive(Debug, Clone)]
pub struct Definition {
    pub type_name: TypeName,
    pub methods: BTreeMap<String, MethodDefinition>,
}

/// The declaration environment the shape builder and the subtyping oracle read from.
pub trait Definitions {
    fn build_instance(&self, name: &TypeName) -> Result<Definition, DefinitionError>;

    fn build_singleton(&self, name: &TypeName) -> Result<Definition, DefinitionError>;

    fn build_interface(&self, name: &TypeName) -> Result<Definition, DefinitionError>;

    /// Generic parameters of a class, module, interface or alias.
    fn type_params(&self, name: &TypeName) -> Result<Vec<TypeParam>, DefinitionError>;

    /// Expands an alias application by exactly one level.
    fn expand_alias(&self, name: &TypeName, args: &[Type]) -> Result<Type, DefinitionError>;

    /// Instance-side ancestors, most specific first, starting with the declaration itself.
    /// Ancestor arguments are expressed in terms of the declaration's own type parameters.
    fn ancestors(&self, name: &TypeName) -> Result<Vec<Type>, DefinitionError>;

    fn is_module(&self, name: &TypeName) -> bool;
}
