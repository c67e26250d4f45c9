use std::collections::BTreeMap;

use shapeflow::method_type::{MethodDecl, MethodName};
use shapeflow::{
    parse_method_type, parse_type, Builder, BuilderError, Config, DeclarationTable,
    DefinitionError, LogicKind, MethodType, NominalSubtyping, Shape, Type, TypeName,
};

const CORE: &str = include_str!("fixtures/core.toml");

const EXTRA: &str = r#"
[[class]]
name = "::Secretive"
super = "::Object"

[[class.method]]
name = "token"
visibility = "private"
types = ["() -> ::String"]

[[class]]
name = "::Open"
super = "::Object"

[[class.method]]
name = "token"
types = ["() -> ::String"]

[[class]]
name = "::NilFirst"
super = "::Object"

[[class.method]]
name = "accept"
types = ["(nil | ::String) -> void"]

[[class]]
name = "::StringFirst"
super = "::Object"

[[class.method]]
name = "accept"
types = ["(::String | nil) -> void"]

[[alias]]
name = "::int_or_str"
type = "::Integer | ::String"

[[alias]]
name = "::loop"
type = "::loop | ::Integer"
"#;

fn with_builder<R>(f: impl FnOnce(&mut Builder<'_>) -> R) -> R {
    let mut table = DeclarationTable::from_toml(CORE).expect("core declarations");
    table.extend_from_toml(EXTRA).expect("extra declarations");
    let subtyping = NominalSubtyping::new(&table);
    let mut builder = Builder::new(&table, &subtyping);
    f(&mut builder)
}

fn ty(source: &str) -> Type {
    parse_type(source).expect("type parses")
}

fn mt(source: &str) -> MethodType {
    parse_method_type(source).expect("method type parses")
}

fn shape_of(builder: &mut Builder<'_>, source: &str) -> Shape {
    builder
        .shape(&ty(source), &Config::empty())
        .expect("shape resolves")
        .expect("type has methods")
}

fn overloads<'s>(shape: &'s Shape, method: &str) -> &'s [MethodType] {
    &shape
        .get(method)
        .unwrap_or_else(|| panic!("{} has no method {method}", shape.ty))
        .method_types
}

fn names(shape: &Shape) -> Vec<String> {
    shape.method_names().map(str::to_string).collect()
}

fn assert_closed(shape: &Shape) {
    for (name, entry) in &shape.methods {
        for method_type in &entry.method_types {
            let leaked = method_type
                .function
                .params
                .types()
                .chain([method_type.return_type()])
                .any(Type::mentions_placeholder);
            assert!(!leaked, "{name}: {method_type} mentions a placeholder");
        }
    }
}

#[test]
fn nominal_instance_shape_is_closed() {
    with_builder(|builder| {
        let shape = shape_of(builder, "::String");
        assert_eq!(shape.ty, ty("::String"));
        assert_closed(&shape);
        assert_eq!(overloads(&shape, "itself"), &[mt("() -> ::String")]);
        assert_eq!(
            overloads(&shape, "between?"),
            &[mt("(::String, ::String) -> bool")]
        );
        assert_eq!(overloads(&shape, "length"), &[mt("() -> ::Integer")]);
    });
}

#[test]
fn generic_arguments_are_applied() {
    with_builder(|builder| {
        let shape = shape_of(builder, "::Array[::Integer]");
        assert_closed(&shape);
        assert_eq!(overloads(&shape, "[]")[0], mt("(::Integer) -> ::Integer"));
        assert_eq!(
            overloads(&shape, "map"),
            &[mt("[U] () { (::Integer) -> U } -> ::Array[U]")]
        );
        assert_eq!(overloads(&shape, "to_a"), &[mt("() -> ::Array[::Integer]")]);
        assert_eq!(
            overloads(&shape, "each"),
            &[mt("() { (::Integer) -> void } -> ::Array[::Integer]")]
        );
    });
}

#[test]
fn singleton_shape_derives_new_from_initialize() {
    with_builder(|builder| {
        let shape = shape_of(builder, "singleton(::String)");
        assert_closed(&shape);
        let new = overloads(&shape, "new");
        assert_eq!(new, &[mt("() -> ::String"), mt("(::String) -> ::String")]);
        assert!(new[0].decls.contains(&MethodDecl {
            method_name: MethodName::Singleton {
                type_name: TypeName::new("::String"),
                method: "new".to_string(),
            },
            defined_in: TypeName::new("::String"),
        }));
        assert_eq!(overloads(&shape, "allocate"), &[mt("() -> ::String")]);
        assert_eq!(overloads(&shape, "try_convert"), &[mt("(untyped) -> ::String?")]);
        assert!(shape.get("length").is_none());
    });
}

#[test]
fn built_in_predicates_carry_logic_types() {
    with_builder(|builder| {
        let string = shape_of(builder, "::String");
        let returns = |shape: &Shape, method: &str| overloads(shape, method)[0].return_type().clone();
        assert_eq!(returns(&string, "is_a?"), Type::Logic(LogicKind::ReceiverIsArg));
        assert_eq!(returns(&string, "kind_of?"), Type::Logic(LogicKind::ReceiverIsArg));
        assert_eq!(returns(&string, "nil?"), Type::Logic(LogicKind::ReceiverIsNil));
        assert_eq!(returns(&string, "!"), Type::Logic(LogicKind::Not));
        assert_eq!(returns(&string, "==="), Type::Logic(LogicKind::ArgEqualsReceiver));
        assert_eq!(returns(&string, "=="), ty("bool"));

        let integer = shape_of(builder, "::Integer");
        assert_eq!(returns(&integer, "zero?"), ty("bool"));

        let class = shape_of(builder, "singleton(::String)");
        assert_eq!(returns(&class, "==="), Type::Logic(LogicKind::ArgIsReceiver));
        assert_eq!(returns(&class, "<"), Type::Logic(LogicKind::ArgIsAncestor));

        let nil = shape_of(builder, "nil");
        assert_eq!(returns(&nil, "nil?"), Type::Logic(LogicKind::ReceiverIsNil));
        assert_eq!(returns(&nil, "!"), Type::Logic(LogicKind::Not));
        assert_eq!(overloads(&nil, "to_a"), &[mt("() -> []")]);
    });
}

#[test]
fn union_keeps_only_common_methods() {
    with_builder(|builder| {
        let string = shape_of(builder, "::String");
        let integer = shape_of(builder, "::Integer");
        let union = shape_of(builder, "::String | ::Integer");
        assert_eq!(union.ty, ty("::String | ::Integer"));

        for name in union.method_names() {
            assert!(string.get(name).is_some() && integer.get(name).is_some(), "{name}");
        }
        assert!(union.get("length").is_none());
        assert!(union.get("zero?").is_none());

        assert_eq!(
            overloads(&union, "+"),
            &[mt("(::String & ::Integer) -> (::String | ::Integer)")]
        );
        // Only the zero-argument overload of `to_s` is shared.
        let to_s = overloads(&union, "to_s");
        assert_eq!(to_s, &[mt("() -> ::String")]);
        assert_eq!(to_s[0].decls.len(), 2);
        assert_eq!(
            overloads(&union, "itself"),
            &[mt("() -> (::String | ::Integer)")]
        );
    });
}

#[test]
fn union_member_order_does_not_split_overloads() {
    with_builder(|builder| {
        let union = shape_of(builder, "::StringFirst | ::NilFirst");
        let accept = overloads(&union, "accept");
        assert_eq!(accept, &[mt("(::String | nil) -> void")]);
        assert_eq!(accept[0].decls.len(), 2);
        assert_eq!(accept[0].to_string(), "(::String | nil) -> void");

        let reversed = shape_of(builder, "::NilFirst | ::StringFirst");
        assert_eq!(reversed.methods, union.methods);
    });
}

#[test]
fn union_entry_is_private_when_any_member_is() {
    with_builder(|builder| {
        let string = shape_of(builder, "::String");
        assert!(string.get("initialize").expect("initialize").is_public());

        let union = shape_of(builder, "::String | ::Integer");
        let initialize = union.get("initialize").expect("initialize");
        assert!(initialize.private);
        assert_eq!(initialize.method_types, vec![mt("() -> void")]);
        assert!(union.public_shape().get("initialize").is_none());

        let mixed = shape_of(builder, "::Open | ::Secretive");
        assert!(mixed.get("token").expect("token").private);
    });
}

#[test]
fn union_shapes_are_memoised() {
    with_builder(|builder| {
        let first = shape_of(builder, "::String | ::Symbol");
        let second = shape_of(builder, "::String | ::Symbol");
        assert_eq!(first, second);
    });
}

#[test]
fn literal_members_share_their_class_shape() {
    with_builder(|builder| {
        let shape = shape_of(builder, "'a' | 'b' | 1");
        assert_eq!(
            overloads(&shape, "itself")[0].return_type(),
            &ty("'a' | 'b' | 1")
        );
        assert!(shape.get("length").is_none());

        let single = shape_of(builder, "'a'");
        assert_eq!(overloads(&single, "itself"), &[mt("() -> 'a'")]);
        assert_eq!(overloads(&single, "upcase"), &[mt("() -> ::String")]);
    });
}

#[test]
fn intersection_collects_every_conjunct() {
    with_builder(|builder| {
        let shape = shape_of(builder, "::_Each[::Integer] & ::_ToS");
        assert_eq!(names(&shape), vec!["each".to_string(), "to_s".to_string()]);
        assert_eq!(
            overloads(&shape, "each"),
            &[mt("() { (::Integer) -> void } -> ::_Each[::Integer]")]
        );
    });
}

#[test]
fn intersection_never_hides_a_public_method() {
    with_builder(|builder| {
        let open_first = shape_of(builder, "::Open & ::Secretive");
        assert!(open_first.get("token").expect("token").is_public());

        let open_last = shape_of(builder, "::Secretive & ::Open");
        assert!(open_last.get("token").expect("token").is_public());

        let secret = shape_of(builder, "::Secretive");
        assert!(secret.get("token").expect("token").private);
    });
}

#[test]
fn tuple_shape_has_per_index_overloads() {
    with_builder(|builder| {
        let shape = shape_of(builder, "[::String, ::Integer]");
        assert_eq!(shape.ty, ty("[::String, ::Integer]"));

        let aref = overloads(&shape, "[]");
        assert_eq!(aref[0], mt("(0) -> ::String"));
        assert_eq!(aref[1], mt("(1) -> ::Integer"));
        assert_eq!(aref[2], mt("(::Integer) -> (::String | ::Integer)"));

        assert_eq!(overloads(&shape, "[]=")[0], mt("(0, ::String) -> ::String"));
        assert_eq!(overloads(&shape, "fetch").len(), 2 * 3 + 2);
        assert_eq!(overloads(&shape, "first"), &[mt("() -> ::String")]);
        assert_eq!(overloads(&shape, "last"), &[mt("() -> ::Integer")]);
        assert_eq!(
            overloads(&shape, "each"),
            &[mt("() { (::String | ::Integer) -> void } -> [::String, ::Integer]")]
        );
    });
}

#[test]
fn empty_tuple_ends_are_nil() {
    with_builder(|builder| {
        let shape = shape_of(builder, "[]");
        assert_eq!(overloads(&shape, "first"), &[mt("() -> nil")]);
        assert_eq!(overloads(&shape, "last"), &[mt("() -> nil")]);
    });
}

#[test]
fn record_shape_has_per_key_overloads() {
    with_builder(|builder| {
        let shape = shape_of(builder, "{ name: ::String, age: ::Integer }");

        let aref = overloads(&shape, "[]");
        assert_eq!(aref[0], mt("(:age) -> ::Integer"));
        assert_eq!(aref[1], mt("(:name) -> ::String"));
        assert_eq!(aref.len(), 3);

        let fetch = overloads(&shape, "fetch");
        assert_eq!(fetch[0], mt("(:age) -> ::Integer"));
        assert_eq!(fetch[1], mt("[T] (:age, T) -> (::Integer | T)"));
        let block = fetch[2].block.as_ref().expect("default block");
        assert_eq!(
            block.function.params.types().cloned().collect::<Vec<_>>(),
            vec![ty(":age | :name")]
        );
    });
}

#[test]
fn proc_shape_calls_with_its_own_signature() {
    with_builder(|builder| {
        let shape = shape_of(builder, "^(::Integer) -> ::String");
        assert_eq!(overloads(&shape, "call"), &[mt("(::Integer) -> ::String")]);
        assert_eq!(overloads(&shape, "[]"), &[mt("(::Integer) -> ::String")]);
        assert_eq!(overloads(&shape, "arity"), &[mt("() -> ::Integer")]);
    });
}

#[test]
fn alias_shape_is_relabelled() {
    with_builder(|builder| {
        let alias = shape_of(builder, "::int_or_str");
        let expanded = shape_of(builder, "::Integer | ::String");
        assert_eq!(alias.ty, ty("::int_or_str"));
        assert_eq!(alias.methods, expanded.methods);
    });
}

#[test]
fn boolean_and_logic_types_share_a_shape() {
    with_builder(|builder| {
        let boolean = shape_of(builder, "bool");
        assert_eq!(
            overloads(&boolean, "!")[0].return_type(),
            &Type::Logic(LogicKind::Not)
        );
        let logic = builder
            .shape(&Type::Logic(LogicKind::ReceiverIsNil), &Config::empty())
            .expect("shape resolves")
            .expect("logic type has methods");
        assert_eq!(names(&logic), names(&boolean));
    });
}

#[test]
fn type_variable_resolves_through_its_bound() {
    with_builder(|builder| {
        let bounds = BTreeMap::from([("T".to_string(), ty("::String"))]);
        let config = Config::empty().with_bounds(bounds);

        let shape = builder
            .shape(&Type::var("T"), &config)
            .expect("shape resolves")
            .expect("bounded variable has methods");
        assert_eq!(shape.ty, Type::var("T"));
        assert_eq!(overloads(&shape, "itself"), &[mt("() -> T")]);
        assert_eq!(overloads(&shape, "upcase"), &[mt("() -> ::String")]);

        let unbound = builder.shape(&Type::var("U"), &config).expect("shape resolves");
        assert!(unbound.is_none());
        let with_unbound = builder
            .shape(&ty("::String | U"), &config)
            .expect("shape resolves");
        assert!(with_unbound.is_none());
    });
}

#[test]
fn placeholders_resolve_through_the_config() {
    with_builder(|builder| {
        let config = Config::for_instance(ty("::String")).expect("closed anchor");

        let self_shape = builder
            .shape(&Type::SelfType, &config)
            .expect("shape resolves")
            .expect("self has methods");
        assert_eq!(overloads(&self_shape, "itself"), &[mt("() -> self")]);
        assert_eq!(overloads(&self_shape, "upcase"), &[mt("() -> ::String")]);

        let instance_shape = builder
            .shape(&Type::Instance, &config)
            .expect("shape resolves")
            .expect("instance has methods");
        assert_eq!(overloads(&instance_shape, "itself"), &[mt("() -> ::String")]);

        let class_shape = builder
            .shape(&Type::Class, &config)
            .expect("shape resolves")
            .expect("class has methods");
        assert!(class_shape.get("new").is_some());
    });
}

#[test]
fn unbound_placeholder_is_an_error() {
    with_builder(|builder| {
        let err = builder
            .shape(&Type::SelfType, &Config::empty())
            .expect_err("self has no anchor");
        assert!(matches!(err, BuilderError::UnboundAnchor(Type::SelfType)));
    });
}

#[test]
fn self_shape_rejects_placeholders() {
    with_builder(|builder| {
        let config = Config::for_instance(ty("::String")).expect("closed anchor");
        let err = builder
            .self_shape(&Type::SelfType, &config)
            .expect_err("placeholder as self anchor");
        assert!(matches!(err, BuilderError::SelfAnchorPlaceholder(_)));

        let shape = builder
            .self_shape(&ty("::String"), &config)
            .expect("shape resolves")
            .expect("string has methods");
        assert_eq!(overloads(&shape, "itself"), &[mt("() -> self")]);
    });
}

#[test]
fn config_rejects_open_anchors() {
    let err = Config::new(Some(ty("::Array[self]")), None, None, BTreeMap::new())
        .expect_err("anchor mentions self");
    assert!(matches!(err, BuilderError::InvalidAnchor { slot: "self", .. }));
}

#[test]
fn cyclic_alias_is_reported() {
    with_builder(|builder| {
        let err = builder
            .shape(&ty("::loop"), &Config::empty())
            .expect_err("alias refers to itself");
        assert!(matches!(err, BuilderError::Cycle(_)));
    });
}

#[test]
fn cyclic_bounds_are_reported() {
    with_builder(|builder| {
        let bounds = BTreeMap::from([
            ("T".to_string(), Type::var("U")),
            ("U".to_string(), Type::var("T")),
        ]);
        let config = Config::empty().with_bounds(bounds);
        let err = builder
            .shape(&Type::var("T"), &config)
            .expect_err("bounds refer to each other");
        assert!(matches!(err, BuilderError::Cycle(_)));
    });
}

#[test]
fn types_without_methods_have_no_shape() {
    with_builder(|builder| {
        for source in ["untyped", "top", "bot", "void", "::String | untyped"] {
            let shape = builder
                .shape(&ty(source), &Config::empty())
                .expect("shape resolves");
            assert!(shape.is_none(), "{source}");
        }
    });
}

#[test]
fn one_member_without_methods_voids_the_composite() {
    with_builder(|builder| {
        for source in ["::String | T", "::String & T"] {
            let shape = builder
                .shape(&ty(source), &Config::empty())
                .expect("shape resolves");
            assert!(shape.is_none(), "{source}");
        }

        let bounds = BTreeMap::from([("T".to_string(), ty("::Integer"))]);
        let config = Config::empty().with_bounds(bounds);
        let union = builder
            .shape(&ty("::String | T"), &config)
            .expect("shape resolves")
            .expect("bounded member has methods");
        assert!(union.get("+").is_some());
        assert!(union.get("length").is_none());
    });
}

#[test]
fn unknown_class_is_a_definition_error() {
    with_builder(|builder| {
        let err = builder
            .shape(&ty("::Missing"), &Config::empty())
            .expect_err("undeclared class");
        assert!(matches!(
            err,
            BuilderError::Definition(DefinitionError::UnknownType(name)) if name.as_str() == "::Missing"
        ));
    });
}
