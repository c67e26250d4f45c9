use shapeflow::{
    parse_type, Builder, Config, DeclarationTable, EnvKey, LogicError, LogicKind,
    LogicTypeInterpreter, Node, NominalSubtyping, Type, TypeEnv, TypeName, Typing, WhenClause,
};
use shapeflow::types::Literal;

const CORE: &str = include_str!("fixtures/core.toml");

fn ty(source: &str) -> Type {
    parse_type(source).expect("type parses")
}

fn table() -> DeclarationTable {
    DeclarationTable::from_toml(CORE).expect("core declarations")
}

fn typing(entries: &[(u32, &str)]) -> Typing {
    let mut typing = Typing::new();
    for (id, source) in entries {
        typing.add_typing(*id, ty(source));
    }
    typing
}

/// Typing for a predicate call at node 1 plus its operands.
fn predicate_typing(kind: LogicKind, operands: &[(u32, &str)]) -> Typing {
    let mut typing = typing(operands);
    typing.add_typing(1, Type::Logic(kind));
    typing
}

fn constant(id: u32, name: &str) -> Node {
    Node::Const {
        id,
        name: TypeName::new(name),
    }
}

#[test]
fn assignment_narrows_the_variable_and_its_value() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[(1, "::String?"), (2, "::String?")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // a = @x
    let node = Node::Assign {
        id: 1,
        name: "a".to_string(),
        value: Box::new(Node::var(2, "@x")),
    };
    let env = TypeEnv::new()
        .assign("a", ty("::String?"))
        .assign("@x", ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_type, ty("::String"));
    assert_eq!(result.falsy_type, ty("nil"));
    assert_eq!(result.truthy_env.get("a"), Some(&ty("::String")));
    assert_eq!(result.truthy_env.get("@x"), Some(&ty("::String")));
    assert_eq!(result.falsy_env.get("a"), Some(&ty("nil")));
    assert!(result.changed.contains(&EnvKey::Var("a".to_string())));
    assert!(result.changed.contains(&EnvKey::Var("@x".to_string())));
    assert_eq!(env.get("a"), Some(&ty("::String?")));
}

#[test]
fn multiple_assignment_from_a_tuple() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[
        (1, "[::String, ::Integer?]?"),
        (2, "[::String, ::Integer?]?"),
    ]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // a, b, c = @x
    let node = Node::MultiAssign {
        id: 1,
        targets: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        value: Box::new(Node::var(2, "@x")),
    };
    let result = interpreter.eval(&TypeEnv::new(), &node).expect("typed");

    assert_eq!(result.truthy_type, ty("[::String, ::Integer?]"));
    assert_eq!(result.falsy_type, ty("nil"));
    assert_eq!(result.truthy_env.get("a"), Some(&ty("::String")));
    assert_eq!(result.truthy_env.get("b"), Some(&ty("::Integer")));
    assert_eq!(result.truthy_env.get("c"), Some(&ty("nil")));
    for name in ["a", "b", "c"] {
        assert_eq!(result.falsy_env.get(name), Some(&ty("nil")), "{name}");
    }
}

#[test]
fn multiple_assignment_from_an_array() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[(1, "::Array[::Integer]"), (2, "::Array[::Integer]")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    let node = Node::MultiAssign {
        id: 1,
        targets: vec!["a".to_string(), "b".to_string()],
        value: Box::new(Node::var(2, "xs")),
    };
    let result = interpreter.eval(&TypeEnv::new(), &node).expect("typed");

    assert_eq!(result.truthy_env.get("a"), Some(&ty("::Integer?")));
    assert_eq!(result.truthy_env.get("b"), Some(&ty("::Integer?")));
    assert_eq!(result.falsy_type, Type::Bot);
}

#[test]
fn pure_call_result_is_narrowed() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[(1, "::String?"), (2, "::String?"), (3, "::Article")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // a = article.email
    let node = Node::Assign {
        id: 1,
        name: "a".to_string(),
        value: Box::new(Node::call(2, Node::var(3, "article"), "email", Vec::new())),
    };
    let env = TypeEnv::new()
        .assign("article", ty("::Article"))
        .add_pure_call(2, ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.pure_call(2), Some(&ty("::String")));
    assert_eq!(result.falsy_env.pure_call(2), Some(&ty("nil")));
    assert_eq!(result.truthy_env.get("a"), Some(&ty("::String")));
    assert_eq!(result.truthy_env.get("article"), Some(&ty("::Article")));
    assert!(result.changed.contains(&EnvKey::Call(2)));
}

#[test]
fn impure_call_changes_nothing() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[(1, "::String?"), (2, "::Article")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    let node = Node::call(1, Node::var(2, "article"), "email", Vec::new());
    let env = TypeEnv::new().assign("article", ty("::Article"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env, env);
    assert_eq!(result.falsy_env, env);
    assert!(result.changed.is_empty());
}

#[test]
fn is_a_narrows_the_receiver() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(
        LogicKind::ReceiverIsArg,
        &[
            (2, "::String | ::Integer | nil"),
            (3, "singleton(::String)"),
        ],
    );
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // value.is_a?(String)
    let node = Node::call(1, Node::var(2, "value"), "is_a?", vec![constant(3, "::String")]);
    let env = TypeEnv::new().assign("value", ty("::String | ::Integer | nil"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("value"), Some(&ty("::String")));
    assert_eq!(result.falsy_env.get("value"), Some(&ty("::Integer | nil")));
    assert_eq!(result.truthy_type, ty("true"));
    assert_eq!(result.falsy_type, ty("false"));
}

#[test]
fn nil_check_narrows_the_receiver() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(LogicKind::ReceiverIsNil, &[(2, "::String?")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // email.nil?
    let node = Node::call(1, Node::var(2, "email"), "nil?", Vec::new());
    let env = TypeEnv::new().assign("email", ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("email"), Some(&ty("nil")));
    assert_eq!(result.falsy_env.get("email"), Some(&ty("::String")));
}

#[test]
fn case_equality_on_a_class_narrows_the_argument() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(
        LogicKind::ArgIsReceiver,
        &[
            (2, "singleton(::String)"),
            (3, "::String?"),
        ],
    );
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // String === email
    let node = Node::call(1, constant(2, "::String"), "===", vec![Node::var(3, "email")]);
    let env = TypeEnv::new().assign("email", ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("email"), Some(&ty("::String")));
    assert_eq!(result.falsy_env.get("email"), Some(&ty("nil")));
}

#[test]
fn case_equality_on_a_literal_narrows_only_the_true_branch() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(
        LogicKind::ArgEqualsReceiver,
        &[
            (2, "::String"),
            (3, "::String?"),
        ],
    );
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // "hello@example.com" === email
    let literal = Node::Literal {
        id: 2,
        value: Literal::String("hello@example.com".to_string()),
    };
    let node = Node::call(1, literal, "===", vec![Node::var(3, "email")]);
    let env = TypeEnv::new().assign("email", ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(
        result.truthy_env.get("email"),
        Some(&ty("'hello@example.com'"))
    );
    assert_eq!(result.falsy_env.get("email"), Some(&ty("::String | nil")));
}

#[test]
fn ancestor_check_narrows_the_receiver() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(
        LogicKind::ArgIsAncestor,
        &[
            (2, "singleton(::Integer) | singleton(::Comparable)"),
            (3, "singleton(::Object)"),
        ],
    );
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // klass < Object
    let node = Node::call(1, Node::var(2, "klass"), "<", vec![constant(3, "::Object")]);
    let env = TypeEnv::new().assign(
        "klass",
        ty("singleton(::Integer) | singleton(::Comparable)"),
    );
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("klass"), Some(&ty("singleton(::Integer)")));
    assert_eq!(
        result.falsy_env.get("klass"),
        Some(&ty("singleton(::Integer) | singleton(::Comparable)"))
    );
}

#[test]
fn negation_swaps_the_branches() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(LogicKind::Not, &[(2, "::String?")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // !email
    let node = Node::call(1, Node::var(2, "email"), "!", Vec::new());
    let env = TypeEnv::new().assign("email", ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("email"), Some(&ty("nil")));
    assert_eq!(result.falsy_env.get("email"), Some(&ty("::String")));
    assert_eq!(result.truthy_type, ty("true"));
}

#[test]
fn conjunction_joins_the_false_branches() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[(2, "::String?"), (3, "::Integer?")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // a && b
    let node = Node::And {
        id: 1,
        left: Box::new(Node::var(2, "a")),
        right: Box::new(Node::var(3, "b")),
    };
    let env = TypeEnv::new()
        .assign("a", ty("::String?"))
        .assign("b", ty("::Integer?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("a"), Some(&ty("::String")));
    assert_eq!(result.truthy_env.get("b"), Some(&ty("::Integer")));
    assert_eq!(result.falsy_env.get("a"), Some(&ty("nil | ::String")));
    assert_eq!(result.falsy_env.get("b"), Some(&ty("::Integer?")));
    assert_eq!(result.truthy_type, ty("::Integer"));
    assert_eq!(result.falsy_type, ty("nil"));
}

#[test]
fn disjunction_joins_the_true_branches() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[(2, "::String?"), (3, "::Integer?")]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // a || b
    let node = Node::Or {
        id: 1,
        left: Box::new(Node::var(2, "a")),
        right: Box::new(Node::var(3, "b")),
    };
    let env = TypeEnv::new()
        .assign("a", ty("::String?"))
        .assign("b", ty("::Integer?"));
    let result = interpreter.eval(&env, &node).expect("typed");

    assert_eq!(result.truthy_env.get("a"), Some(&ty("::String?")));
    assert_eq!(result.truthy_env.get("b"), Some(&ty("::Integer?")));
    assert_eq!(result.falsy_env.get("a"), Some(&ty("nil")));
    assert_eq!(result.falsy_env.get("b"), Some(&ty("nil")));
    assert_eq!(result.truthy_type, ty("::String | ::Integer"));
}

#[test]
fn case_when_splits_the_scrutinee() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = typing(&[
        (1, "untyped"),
        (2, "::String | ::Integer | ::Symbol | nil"),
        (3, "singleton(::String)"),
        (4, "singleton(::Integer)"),
        (5, "::Symbol"),
    ]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    // case x when String then ... when Integer, :ok then ... else ... end
    let node = Node::Case {
        id: 1,
        scrutinee: Some(Box::new(Node::var(2, "x"))),
        whens: vec![
            WhenClause {
                patterns: vec![constant(3, "::String")],
                body: None,
            },
            WhenClause {
                patterns: vec![
                    constant(4, "::Integer"),
                    Node::Literal {
                        id: 5,
                        value: Literal::Symbol("ok".to_string()),
                    },
                ],
                body: None,
            },
        ],
        else_body: None,
    };
    let env = TypeEnv::new().assign("x", ty("::String | ::Integer | ::Symbol | nil"));
    let narrowing = interpreter.eval_case(&env, &node).expect("typed");

    assert_eq!(narrowing.clauses.len(), 2);
    assert_eq!(narrowing.clauses[0].get("x"), Some(&ty("::String")));
    assert_eq!(narrowing.clauses[1].get("x"), Some(&ty("::Integer | :ok")));
    assert_eq!(narrowing.else_env.get("x"), Some(&ty("::Symbol | nil")));
}

#[test]
fn missing_typing_is_an_error() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let typing = predicate_typing(LogicKind::ReceiverIsNil, &[]);
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    let node = Node::call(1, Node::var(2, "email"), "nil?", Vec::new());
    let err = interpreter
        .eval(&TypeEnv::new(), &node)
        .expect_err("receiver has no type");
    assert_eq!(err, LogicError::Untyped(2));
}

#[test]
fn shape_return_types_drive_narrowing() {
    let table = table();
    let subtyping = NominalSubtyping::new(&table);
    let mut builder = Builder::new(&table, &subtyping);

    let shape = builder
        .shape(&ty("::String?"), &Config::empty())
        .expect("shape resolves")
        .expect("optional string has methods");
    let is_a = shape.get("is_a?").expect("is_a?").method_types[0].return_type().clone();
    let nil_p = shape.get("nil?").expect("nil?").method_types[0].return_type().clone();
    assert_eq!(is_a, Type::Logic(LogicKind::ReceiverIsArg));
    assert_eq!(nil_p, Type::Logic(LogicKind::ReceiverIsNil));

    let mut typing = Typing::new();
    typing.add_typing(1, nil_p);
    typing.add_typing(2, ty("::String?"));
    let interpreter = LogicTypeInterpreter::new(&subtyping, &typing);

    let node = Node::call(1, Node::var(2, "email"), "nil?", Vec::new());
    let env = TypeEnv::new().assign("email", ty("::String?"));
    let result = interpreter.eval(&env, &node).expect("typed");
    assert_eq!(result.falsy_env.get("email"), Some(&ty("::String")));
}
