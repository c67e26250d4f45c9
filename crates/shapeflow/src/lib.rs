pub mod builder;
pub mod definitions;
pub mod logic;
pub mod method_type;
pub mod shape;
pub mod substitution;
pub mod subtyping;
pub mod syntax;
pub mod types;
pub mod typing;

pub use builder::{Builder, BuilderError, Config};
pub use definitions::{DeclarationTable, DefinitionError, Definitions};
pub use logic::{
    type_case_select, CaseNarrowing, EnvKey, Evaluation, LogicError, LogicTypeInterpreter, Node,
    NodeId, TypeEnv, WhenClause,
};
pub use method_type::{Block, Function, MethodType, Params, TypeParam};
pub use shape::{Entry, Shape};
pub use substitution::{Anchors, Substitution, SubstitutionError};
pub use subtyping::{NominalSubtyping, Subtyping};
pub use syntax::{parse_method_type, parse_type, SyntaxError};
pub use types::{Literal, LogicKind, Type, TypeName};
pub use typing::Typing;
