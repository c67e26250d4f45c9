use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{
    Definition, DefinitionError, Definitions, MemberKind, MethodDefinition, TypeDef, Visibility,
};
use crate::method_type::{MethodType, TypeParam};
use crate::substitution::{Anchors, Substitution};
use crate::syntax::{parse_method_type, parse_type, parse_type_param};
use crate::types::{builtin, Type, TypeName};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationFile {
    #[serde(default)]
    class: Vec<RawModuleDecl>,
    #[serde(default)]
    module: Vec<RawModuleDecl>,
    #[serde(default)]
    interface: Vec<RawModuleDecl>,
    #[serde(default)]
    alias: Vec<RawAliasDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModuleDecl {
    name: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default, rename = "super")]
    super_class: Option<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    method: Vec<RawMethodDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMethodDecl {
    name: String,
    #[serde(default)]
    kind: MemberKind,
    #[serde(default)]
    visibility: Visibility,
    types: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAliasDecl {
    name: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(rename = "type")]
    body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Class,
    Module,
    Interface,
}

impl DeclKind {
    fn label(self) -> &'static str {
        match self {
            DeclKind::Class => "class",
            DeclKind::Module => "module",
            DeclKind::Interface => "interface",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MethodMember {
    pub name: String,
    pub kind: MemberKind,
    pub visibility: Visibility,
    pub types: Vec<MethodType>,
}

#[derive(Debug, Clone)]
pub struct ModuleDecl {
    pub name: TypeName,
    pub kind: DeclKind,
    pub type_params: Vec<TypeParam>,
    pub super_class: Option<Type>,
    pub includes: Vec<Type>,
    pub methods: Vec<MethodMember>,
}

#[derive(Debug, Clone)]
pub struct AliasDecl {
    pub name: TypeName,
    pub type_params: Vec<TypeParam>,
    pub body: Type,
}

/// In-memory declaration environment, usually loaded from TOML signature files.
#[derive(Debug, Clone, Default)]
pub struct DeclarationTable {
    modules: BTreeMap<TypeName, ModuleDecl>,
    aliases: BTreeMap<TypeName, AliasDecl>,
}

impl DeclarationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(source: &str) -> Result<Self, DefinitionError> {
        let mut table = Self::new();
        table.extend_from_toml(source)?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let source = fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&source)
    }

    /// Adds the declarations of another signature file; reopened classes and modules gain
    /// the new members.
    pub fn extend_from_toml(&mut self, source: &str) -> Result<(), DefinitionError> {
        let file: DeclarationFile = toml::from_str(source)?;
        for (kind, decls) in [
            (DeclKind::Class, file.class),
            (DeclKind::Module, file.module),
            (DeclKind::Interface, file.interface),
        ] {
            for raw in decls {
                let decl = lower_module_decl(kind, raw)?;
                self.insert_module(decl)?;
            }
        }
        for raw in file.alias {
            let name = TypeName::new(&raw.name);
            let type_params = lower_type_params(&name, &raw.params)?;
            let body = parse_type(&raw.body).map_err(|source| DefinitionError::Syntax {
                context: format!("alias {name}"),
                source,
            })?;
            self.insert_alias(AliasDecl {
                name,
                type_params,
                body,
            })?;
        }
        Ok(())
    }

    pub fn insert_module(&mut self, decl: ModuleDecl) -> Result<(), DefinitionError> {
        if self.aliases.contains_key(&decl.name) {
            return Err(DefinitionError::ConflictingDeclaration {
                name: decl.name,
                first: "alias",
                second: decl.kind.label(),
            });
        }
        match self.modules.get_mut(&decl.name) {
            Some(existing) if existing.kind != decl.kind => {
                Err(DefinitionError::ConflictingDeclaration {
                    name: decl.name,
                    first: existing.kind.label(),
                    second: decl.kind.label(),
                })
            }
            Some(existing) => {
                if existing.super_class.is_none() {
                    existing.super_class = decl.super_class;
                }
                existing.includes.extend(decl.includes);
                existing.methods.extend(decl.methods);
                Ok(())
            }
            None => {
                self.modules.insert(decl.name.clone(), decl);
                Ok(())
            }
        }
    }

    pub fn insert_alias(&mut self, decl: AliasDecl) -> Result<(), DefinitionError> {
        if let Some(existing) = self.modules.get(&decl.name) {
            return Err(DefinitionError::ConflictingDeclaration {
                name: decl.name,
                first: existing.kind.label(),
                second: "alias",
            });
        }
        self.aliases.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn module(&self, name: &TypeName) -> Option<&ModuleDecl> {
        self.modules.get(name)
    }

    fn fetch_module(&self, name: &TypeName) -> Result<&ModuleDecl, DefinitionError> {
        self.modules
            .get(name)
            .ok_or_else(|| DefinitionError::UnknownType(name.clone()))
    }

    /// Linearised instance ancestors with the substitution from each ancestor's own type
    /// parameters to the arguments it is applied to.
    fn linearize(
        &self,
        name: &TypeName,
        subst: Substitution,
        visited: &mut HashSet<TypeName>,
        out: &mut Vec<(TypeName, Substitution)>,
    ) -> Result<(), DefinitionError> {
        if !visited.insert(name.clone()) {
            return Ok(());
        }
        let decl = self.fetch_module(name)?;
        out.push((name.clone(), subst.clone()));
        for included in decl.includes.iter().rev() {
            self.linearize_applied(&subst.apply(included), visited, out)?;
        }
        if let Some(super_class) = &decl.super_class {
            self.linearize_applied(&subst.apply(super_class), visited, out)?;
        }
        Ok(())
    }

    fn linearize_applied(
        &self,
        ty: &Type,
        visited: &mut HashSet<TypeName>,
        out: &mut Vec<(TypeName, Substitution)>,
    ) -> Result<(), DefinitionError> {
        let (name, args) = match ty {
            Type::ClassInstance { name, args } | Type::Interface { name, args } => (name, args),
            _ => return Ok(()),
        };
        let decl = self.fetch_module(name)?;
        let subst = param_subst(&decl.type_params, args);
        self.linearize(name, subst, visited, out)
    }

    fn ancestor_chain(
        &self,
        name: &TypeName,
    ) -> Result<Vec<(TypeName, Substitution)>, DefinitionError> {
        let mut out = Vec::new();
        self.linearize(name, Substitution::empty(), &mut HashSet::new(), &mut out)?;
        Ok(out)
    }

    fn insert_members(
        &self,
        methods: &mut BTreeMap<String, MethodDefinition>,
        owner: &ModuleDecl,
        subst: &Substitution,
        accept: impl Fn(MemberKind) -> bool,
        private_kind: Option<MemberKind>,
    ) {
        let implemented_in = (owner.kind == DeclKind::Class).then(|| owner.name.clone());
        for member in owner.methods.iter().filter(|member| accept(member.kind)) {
            let visibility = if Some(member.kind) == private_kind {
                Visibility::Private
            } else {
                member.visibility
            };
            let defs = member
                .types
                .iter()
                .map(|method_type| TypeDef {
                    method_type: subst.apply_method_type(method_type),
                    defined_in: owner.name.clone(),
                    implemented_in: implemented_in.clone(),
                    member_kind: member.kind,
                    member_name: member.name.clone(),
                })
                .collect();
            methods.insert(member.name.clone(), MethodDefinition { visibility, defs });
        }
    }

    fn derived_new(&self, name: &TypeName) -> Result<Option<MethodDefinition>, DefinitionError> {
        for (ancestor, subst) in self.ancestor_chain(name)? {
            let decl = self.fetch_module(&ancestor)?;
            let initialize = decl
                .methods
                .iter()
                .rev()
                .find(|member| member.name == "initialize" && member.kind.is_instance());
            if let Some(member) = initialize {
                let defs = member
                    .types
                    .iter()
                    .map(|method_type| TypeDef {
                        method_type: subst
                            .apply_method_type(method_type)
                            .with_return_type(Type::Instance),
                        defined_in: ancestor.clone(),
                        implemented_in: Some(ancestor.clone()),
                        member_kind: member.kind,
                        member_name: member.name.clone(),
                    })
                    .collect();
                return Ok(Some(MethodDefinition {
                    visibility: Visibility::Public,
                    defs,
                }));
            }
        }
        Ok(None)
    }
}

fn param_subst(params: &[TypeParam], args: &[Type]) -> Substitution {
    let names: Vec<String> = params.iter().map(|param| param.name.clone()).collect();
    let values: Vec<Type> = if args.is_empty() {
        vec![Type::Any; names.len()]
    } else {
        args.to_vec()
    };
    Substitution::build(&names, &values, Anchors::default()).unwrap_or_else(|err| {
        debug!(%err, "type argument count mismatch; arguments ignored");
        Substitution::empty()
    })
}

fn lower_type_params(owner: &TypeName, params: &[String]) -> Result<Vec<TypeParam>, DefinitionError> {
    params
        .iter()
        .map(|param| {
            parse_type_param(param).map_err(|source| DefinitionError::Syntax {
                context: format!("type parameters of {owner}"),
                source,
            })
        })
        .collect()
}

fn lower_module_decl(kind: DeclKind, raw: RawModuleDecl) -> Result<ModuleDecl, DefinitionError> {
    let name = TypeName::new(&raw.name);
    let parse_ancestor = |source: &str| -> Result<Type, DefinitionError> {
        parse_type(source).map_err(|err| DefinitionError::Syntax {
            context: format!("ancestors of {name}"),
            source: err,
        })
    };
    let super_class = raw.super_class.as_deref().map(parse_ancestor).transpose()?;
    let includes = raw
        .include
        .iter()
        .map(|source| parse_ancestor(source))
        .collect::<Result<Vec<_>, _>>()?;
    let mut methods = Vec::new();
    for method in raw.method {
        let types = method
            .types
            .iter()
            .map(|source| {
                parse_method_type(source).map_err(|err| DefinitionError::Syntax {
                    context: format!("{name}#{}", method.name),
                    source: err,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        methods.push(MethodMember {
            name: method.name,
            kind: method.kind,
            visibility: method.visibility,
            types,
        });
    }
    Ok(ModuleDecl {
        type_params: lower_type_params(&name, &raw.params)?,
        name,
        kind,
        super_class,
        includes,
        methods,
    })
}

impl Definitions for DeclarationTable {
    fn build_instance(&self, name: &TypeName) -> Result<Definition, DefinitionError> {
        let decl = self.fetch_module(name)?;
        if decl.kind == DeclKind::Interface {
            return self.build_interface(name);
        }
        debug!(%name, "building instance definition");
        let mut methods = BTreeMap::new();
        for (ancestor, subst) in self.ancestor_chain(name)?.into_iter().rev() {
            let owner = self.fetch_module(&ancestor)?;
            self.insert_members(
                &mut methods,
                owner,
                &subst,
                MemberKind::is_instance,
                Some(MemberKind::SingletonInstance),
            );
        }
        Ok(Definition {
            type_name: name.clone(),
            methods,
        })
    }

    fn build_singleton(&self, name: &TypeName) -> Result<Definition, DefinitionError> {
        let decl = self.fetch_module(name)?;
        if decl.kind == DeclKind::Interface {
            return Err(DefinitionError::UnknownType(name.clone()));
        }
        debug!(%name, "building singleton definition");
        let meta = TypeName::new(match decl.kind {
            DeclKind::Class => builtin::CLASS,
            _ => builtin::MODULE,
        });
        let mut methods = if self.modules.contains_key(&meta) {
            self.build_instance(&meta)?.methods
        } else {
            BTreeMap::new()
        };

        let mut chain = Vec::new();
        let mut cursor = Some(name.clone());
        let mut seen = HashSet::new();
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                break;
            }
            let current_decl = self.fetch_module(&current)?;
            cursor = match &current_decl.super_class {
                Some(Type::ClassInstance { name, .. }) => Some(name.clone()),
                _ => None,
            };
            chain.push(current_decl);
        }

        if decl.kind == DeclKind::Class {
            if let Some(new) = self.derived_new(name)? {
                methods.insert("new".to_string(), new);
            }
        }
        for owner in chain.into_iter().rev() {
            self.insert_members(
                &mut methods,
                owner,
                &Substitution::empty(),
                MemberKind::is_singleton,
                None,
            );
        }
        Ok(Definition {
            type_name: name.clone(),
            methods,
        })
    }

    fn build_interface(&self, name: &TypeName) -> Result<Definition, DefinitionError> {
        let decl = self.fetch_module(name)?;
        if decl.kind != DeclKind::Interface {
            return Err(DefinitionError::UnknownType(name.clone()));
        }
        debug!(%name, "building interface definition");
        let mut methods = BTreeMap::new();
        for (ancestor, subst) in self.ancestor_chain(name)?.into_iter().rev() {
            let owner = self.fetch_module(&ancestor)?;
            self.insert_members(&mut methods, owner, &subst, |_| true, None);
        }
        Ok(Definition {
            type_name: name.clone(),
            methods,
        })
    }

    fn type_params(&self, name: &TypeName) -> Result<Vec<TypeParam>, DefinitionError> {
        if let Some(decl) = self.modules.get(name) {
            return Ok(decl.type_params.clone());
        }
        if let Some(alias) = self.aliases.get(name) {
            return Ok(alias.type_params.clone());
        }
        Err(DefinitionError::UnknownType(name.clone()))
    }

    fn expand_alias(&self, name: &TypeName, args: &[Type]) -> Result<Type, DefinitionError> {
        let alias = self
            .aliases
            .get(name)
            .ok_or_else(|| DefinitionError::UnknownType(name.clone()))?;
        Ok(param_subst(&alias.type_params, args).apply(&alias.body))
    }

    fn ancestors(&self, name: &TypeName) -> Result<Vec<Type>, DefinitionError> {
        let chain = self.ancestor_chain(name)?;
        let mut out = Vec::with_capacity(chain.len());
        for (ancestor, subst) in chain {
            let decl = self.fetch_module(&ancestor)?;
            let args = decl
                .type_params
                .iter()
                .map(|param| subst.apply(&Type::var(param.name.clone())))
                .collect();
            out.push(match decl.kind {
                DeclKind::Interface => Type::Interface {
                    name: ancestor,
                    args,
                },
                DeclKind::Class | DeclKind::Module => Type::ClassInstance {
                    name: ancestor,
                    args,
                },
            });
        }
        Ok(out)
    }

    fn is_module(&self, name: &TypeName) -> bool {
        self.modules
            .get(name)
            .is_some_and(|decl| decl.kind == DeclKind::Module)
    }
}
