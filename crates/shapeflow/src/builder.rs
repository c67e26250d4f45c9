use std::collections::{BTreeSet, HashMap};

use tracing::{debug, instrument};

use crate::definitions::{Definition, DefinitionError, Definitions, MemberKind, TypeDef};
use crate::method_type::{MethodDecl, MethodName};
use crate::shape::{Entry, Shape};
use crate::substitution::{Anchors, Substitution, SubstitutionError};
use crate::subtyping::Subtyping;
use crate::types::{builtin, Type, TypeName};

mod config;
mod merge;
mod primitive;
mod projection;

pub use self::config::Config;
pub use self::primitive::logic_kind_for;

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("{slot} anchor must not mention self, instance or class: {ty}")]
    InvalidAnchor { slot: &'static str, ty: Type },
    #[error("`{0}` has no anchor in the configuration")]
    UnboundAnchor(Type),
    #[error("`{0}` cannot be resolved as the self anchor")]
    SelfAnchorPlaceholder(Type),
    #[error("cyclic type while building shape: {0}")]
    Cycle(Type),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),
}

/// Which entry point a resolution runs under. `SelfAnchor` leaves the self slot of
/// nominal-like results open and refuses to resolve placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Raw,
    SelfAnchor,
}

/// Computes method tables for types, memoizing declaration lookups for one session.
pub struct Builder<'a> {
    definitions: &'a dyn Definitions,
    subtyping: &'a dyn Subtyping,
    object_shape_cache: HashMap<TypeName, Shape>,
    singleton_shape_cache: HashMap<TypeName, Shape>,
    union_shape_cache: HashMap<(Type, Config), Shape>,
    in_progress: Vec<Type>,
}

impl<'a> Builder<'a> {
    pub fn new(definitions: &'a dyn Definitions, subtyping: &'a dyn Subtyping) -> Self {
        Self {
            definitions,
            subtyping,
            object_shape_cache: HashMap::new(),
            singleton_shape_cache: HashMap::new(),
            union_shape_cache: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Fully resolved shape of `ty`. `Ok(None)` for unbound variables and types without
    /// methods (`untyped`, `top`, `bot`, `void`).
    #[instrument(level = tracing::Level::TRACE, skip(self, ty, config), fields(ty = %ty))]
    pub fn shape(&mut self, ty: &Type, config: &Config) -> Result<Option<Shape>, BuilderError> {
        let Some(shape) = self.resolve(ty, config, Mode::Raw)? else {
            return Ok(None);
        };
        // `self` keeps its binding so recursive return types stay open.
        if matches!(ty, Type::SelfType) {
            return Ok(Some(shape));
        }
        Ok(Some(match config.subst() {
            Some(subst) => shape.subst(&subst, None),
            None => shape,
        }))
    }

    /// Shape of a type standing in for `self`.
    #[instrument(level = tracing::Level::TRACE, skip(self, ty, config), fields(ty = %ty))]
    pub fn self_shape(&mut self, ty: &Type, config: &Config) -> Result<Option<Shape>, BuilderError> {
        self.resolve(ty, config, Mode::SelfAnchor)
    }

    fn resolve(
        &mut self,
        ty: &Type,
        config: &Config,
        mode: Mode,
    ) -> Result<Option<Shape>, BuilderError> {
        let keep_self = mode == Mode::SelfAnchor;
        // Self anchor used when a result describes `ty` itself.
        let own_self = |ty: &Type| if keep_self { None } else { Some(ty.clone()) };

        match ty {
            Type::SelfType | Type::Instance | Type::Class if keep_self => {
                Err(BuilderError::SelfAnchorPlaceholder(ty.clone()))
            }
            Type::SelfType => {
                let self_type = config
                    .self_type()
                    .ok_or_else(|| BuilderError::UnboundAnchor(ty.clone()))?
                    .clone();
                self.resolve(&self_type, config, Mode::SelfAnchor)
            }
            Type::Instance => {
                let instance_type = config
                    .instance_type()
                    .ok_or_else(|| BuilderError::UnboundAnchor(ty.clone()))?
                    .clone();
                self.resolve(&instance_type, config, Mode::Raw)
            }
            Type::Class => {
                let class_type = config
                    .class_type()
                    .ok_or_else(|| BuilderError::UnboundAnchor(ty.clone()))?
                    .clone();
                self.resolve(&class_type, config, Mode::Raw)
            }
            Type::ClassSingleton { name } => {
                let subst = self.class_subst(ty).update_self_type(own_self(ty));
                let shape = self.singleton_shape(name)?;
                Ok(Some(shape.subst(&subst, Some(ty.clone()))))
            }
            Type::ClassInstance { name, .. } => {
                let subst = self
                    .class_subst(ty)
                    .update_self_type(own_self(ty))
                    .merge(&self.app_subst(ty)?)?;
                let shape = self.object_shape(name)?;
                Ok(Some(shape.subst(&subst, Some(ty.clone()))))
            }
            Type::Interface { name, .. } => {
                let app = self.app_subst(ty)?;
                let subst = if keep_self {
                    app
                } else {
                    Substitution::from_anchors(Anchors {
                        self_type: Some(ty.clone()),
                        ..Anchors::default()
                    })
                    .merge(&app)?
                };
                let shape = self.object_shape(name)?;
                Ok(Some(shape.subst(&subst, Some(ty.clone()))))
            }
            Type::Literal(literal) => {
                let back_type = literal.back_type();
                let subst = self.class_subst(&back_type).update_self_type(own_self(ty));
                let shape = self.object_shape(&literal.back_type_name())?;
                Ok(Some(shape.subst(&subst, Some(ty.clone()))))
            }
            Type::Boolean => self.boolean_shape(ty, own_self(ty)).map(Some),
            Type::Proc(proc_type) => {
                let proc_class = builtin_instance(builtin::PROC);
                let subst = self.class_subst(&proc_class).update_self_type(own_self(ty));
                let base = self.object_shape(&TypeName::new(builtin::PROC))?;
                Ok(Some(projection::proc_shape(
                    ty,
                    proc_type,
                    base.subst(&subst, None),
                )))
            }
            Type::Var(name) => {
                let Some(bound) = config.upper_bound(name).cloned() else {
                    return Ok(None);
                };
                self.guarded(ty, |builder| {
                    if keep_self {
                        let shape = builder.resolve(&bound, config, Mode::SelfAnchor)?;
                        return Ok(shape.map(|shape| shape.update(ty.clone())));
                    }
                    // `self` inside the bound means the bound itself, then the variable.
                    let bound_config =
                        Config::new(Some(bound.clone()), None, None, config.variable_bounds().clone())?;
                    let shape = builder.resolve(&bound, &bound_config, Mode::SelfAnchor)?;
                    let rebind = Substitution::from_anchors(Anchors {
                        self_type: Some(ty.clone()),
                        ..Anchors::default()
                    });
                    Ok(shape.map(|shape| shape.subst(&rebind, Some(ty.clone()))))
                })
            }
            Type::Alias { name, args } => self.guarded(ty, |builder| {
                let expanded = builder.definitions.expand_alias(name, args)?;
                let shape = builder.resolve(&expanded, config, Mode::Raw)?;
                Ok(shape.map(|shape| shape.update(ty.clone())))
            }),
            Type::Union(members) => self.resolve_union(ty, members, config),
            Type::Intersection(members) => {
                let mut shapes = Vec::with_capacity(members.len());
                for member in members {
                    let Some(shape) = self.resolve(member, config, Mode::Raw)? else {
                        return Ok(None);
                    };
                    shapes.push(shape);
                }
                Ok(Some(merge::intersection_shape(ty, shapes)))
            }
            Type::Logic(_) => self.boolean_shape(ty, Some(ty.clone())).map(Some),
            Type::Tuple(items) => {
                let array = Type::instance(
                    TypeName::new(builtin::ARRAY),
                    vec![Type::union(items.iter().cloned())],
                );
                let base = self.anchored_builtin_shape(ty, &array)?;
                Ok(Some(projection::tuple_shape(ty, items, base)))
            }
            Type::Record(fields) => {
                let hash = Type::instance(
                    TypeName::new(builtin::HASH),
                    vec![
                        Type::union(fields.keys().cloned().map(Type::Literal)),
                        Type::union(fields.values().cloned()),
                    ],
                );
                let base = self.anchored_builtin_shape(ty, &hash)?;
                Ok(Some(projection::record_shape(ty, fields, base)))
            }
            Type::Nil => {
                let nil_class = builtin_instance(builtin::NIL_CLASS);
                let subst = self.class_subst(&nil_class).update_self_type(Some(ty.clone()));
                let shape = self.object_shape(&TypeName::new(builtin::NIL_CLASS))?;
                Ok(Some(shape.subst(&subst, Some(ty.clone()))))
            }
            Type::Any | Type::Top | Type::Bot | Type::Void => Ok(None),
        }
    }

    /// Shape of a generic built-in instance whose `self` is the structural type `ty`.
    fn anchored_builtin_shape(&mut self, ty: &Type, instance: &Type) -> Result<Shape, BuilderError> {
        let Type::ClassInstance { name, .. } = instance else {
            return Err(BuilderError::UnboundAnchor(instance.clone()));
        };
        let subst = self
            .class_subst(instance)
            .update_self_type(Some(ty.clone()))
            .merge(&self.app_subst(instance)?)?;
        Ok(self.object_shape(name)?.subst(&subst, None))
    }

    fn boolean_shape(&mut self, ty: &Type, self_type: Option<Type>) -> Result<Shape, BuilderError> {
        let mut shapes = Vec::with_capacity(2);
        for class in [builtin::TRUE_CLASS, builtin::FALSE_CLASS] {
            let instance = builtin_instance(class);
            let subst = self.class_subst(&instance).update_self_type(self_type.clone());
            shapes.push(self.object_shape(&TypeName::new(class))?.subst(&subst, None));
        }
        Ok(self.union_shape(ty, shapes))
    }

    fn resolve_union(
        &mut self,
        ty: &Type,
        members: &[Type],
        config: &Config,
    ) -> Result<Option<Shape>, BuilderError> {
        let key = (ty.clone(), config.clone());
        if let Some(shape) = self.union_shape_cache.get(&key) {
            return Ok(Some(shape.clone()));
        }

        // Literals sharing a backing class are resolved together, in first-seen order.
        let mut groups: Vec<(Option<TypeName>, Vec<Type>)> = Vec::new();
        for member in members {
            let group = match member {
                Type::Literal(literal) => Some(literal.back_type_name()),
                _ => None,
            };
            match groups.iter_mut().find(|(name, _)| *name == group) {
                Some((_, types)) => types.push(member.clone()),
                None => groups.push((group, vec![member.clone()])),
            }
        }

        let mut shapes = Vec::new();
        for (group, types) in groups {
            match group {
                Some(name) => {
                    let literals = Type::union(types);
                    let subst = self
                        .class_subst(&Type::instance(name.clone(), Vec::new()))
                        .update_self_type(Some(literals.clone()));
                    shapes.push(self.object_shape(&name)?.subst(&subst, Some(literals)));
                }
                None => {
                    for member in &types {
                        let Some(shape) = self.resolve(member, config, Mode::Raw)? else {
                            return Ok(None);
                        };
                        shapes.push(shape);
                    }
                }
            }
        }

        debug!(%ty, "union shape cache miss");
        let shape = self.union_shape(ty, shapes);
        self.union_shape_cache.insert(key, shape.clone());
        Ok(Some(shape))
    }

    /// Runs `f` with `ty` marked as in progress; re-entering the same type is a cycle.
    fn guarded<T>(
        &mut self,
        ty: &Type,
        f: impl FnOnce(&mut Self) -> Result<T, BuilderError>,
    ) -> Result<T, BuilderError> {
        if self.in_progress.contains(ty) {
            return Err(BuilderError::Cycle(ty.clone()));
        }
        self.in_progress.push(ty.clone());
        let result = f(self);
        self.in_progress.pop();
        result
    }

    /// Anchors for a nominal type: itself, its singleton, and its untyped instance.
    fn class_subst(&self, ty: &Type) -> Substitution {
        let anchors = match ty {
            Type::ClassSingleton { name } => Anchors {
                self_type: Some(ty.clone()),
                module_type: Some(ty.clone()),
                instance_type: Some(self.subtyping.instance_type(name)),
            },
            Type::ClassInstance { name, .. } => Anchors {
                self_type: Some(ty.clone()),
                module_type: Some(Type::singleton(name.clone())),
                instance_type: Some(self.subtyping.instance_type(name)),
            },
            _ => Anchors::default(),
        };
        Substitution::from_anchors(anchors)
    }

    /// Binds the declared type parameters of a generic application to its arguments.
    fn app_subst(&self, ty: &Type) -> Result<Substitution, BuilderError> {
        let (name, args) = match ty {
            Type::ClassInstance { name, args }
            | Type::Interface { name, args }
            | Type::Alias { name, args } => (name, args),
            _ => return Ok(Substitution::empty()),
        };
        if args.is_empty() {
            return Ok(Substitution::empty());
        }
        let vars: Vec<String> = self
            .definitions
            .type_params(name)?
            .into_iter()
            .map(|param| param.name)
            .collect();
        Ok(Substitution::build(&vars, args, Anchors::default())?)
    }

    fn object_shape(&mut self, name: &TypeName) -> Result<Shape, BuilderError> {
        if let Some(shape) = self.object_shape_cache.get(name) {
            return Ok(shape.clone());
        }
        debug!(%name, "object shape cache miss");
        let definition = if name.is_interface() {
            self.definitions.build_interface(name)?
        } else {
            self.definitions.build_instance(name)?
        };
        let shape = shape_of_definition(Type::Bot, &definition);
        self.object_shape_cache.insert(name.clone(), shape.clone());
        Ok(shape)
    }

    fn singleton_shape(&mut self, name: &TypeName) -> Result<Shape, BuilderError> {
        if let Some(shape) = self.singleton_shape_cache.get(name) {
            return Ok(shape.clone());
        }
        debug!(%name, "singleton shape cache miss");
        let definition = self.definitions.build_singleton(name)?;
        let shape = shape_of_definition(Type::singleton(name.clone()), &definition);
        self.singleton_shape_cache.insert(name.clone(), shape.clone());
        Ok(shape)
    }
}

fn builtin_instance(name: &str) -> Type {
    Type::instance(TypeName::new(name), Vec::new())
}

fn shape_of_definition(ty: Type, definition: &Definition) -> Shape {
    let mut shape = Shape::new(ty);
    for (name, method) in &definition.methods {
        let method_types = method
            .defs
            .iter()
            .map(|type_def| {
                let method_name = method_name_for(type_def, name);
                let decl = MethodDecl {
                    method_name: method_name.clone(),
                    defined_in: type_def.defined_in.clone(),
                };
                let method_type = type_def
                    .method_type
                    .clone()
                    .with_decls(BTreeSet::from([decl]));
                primitive::replace_primitive_method(name, type_def, method_type)
            })
            .collect();
        shape
            .methods
            .insert(name.clone(), Entry::new(method_types, method.is_private()));
    }
    shape
}

/// Provenance name of an overload. A `new` derived from `initialize` is a singleton method
/// and `module_function` members count as instance methods.
fn method_name_for(type_def: &TypeDef, name: &str) -> MethodName {
    let type_name = type_def
        .implemented_in
        .clone()
        .unwrap_or_else(|| type_def.defined_in.clone());
    let method = name.to_string();
    if name == "new" && type_def.member_name == "initialize" {
        return MethodName::Singleton { type_name, method };
    }
    match type_def.member_kind {
        MemberKind::Instance | MemberKind::SingletonInstance => {
            MethodName::Instance { type_name, method }
        }
        MemberKind::Singleton => MethodName::Singleton { type_name, method },
    }
}
