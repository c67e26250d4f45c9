use tracing::trace;

use crate::definitions::TypeDef;
use crate::method_type::MethodType;
use crate::types::{builtin, LogicKind, Type};

struct PredicateRewrite {
    method: &'static str,
    declared_in: &'static [&'static str],
    instance_only: bool,
    kind: LogicKind,
}

const OBJECT_LIKE: &[&str] = &[builtin::OBJECT, builtin::KERNEL];
const NIL_TESTS: &[&str] = &[builtin::OBJECT, builtin::NIL_CLASS, builtin::KERNEL];
const NEGATION: &[&str] = &[
    builtin::BASIC_OBJECT,
    builtin::TRUE_CLASS,
    builtin::FALSE_CLASS,
    builtin::NIL_CLASS,
];
const MODULE: &[&str] = &[builtin::MODULE];
// Classes whose values have literal types.
const LITERAL_EQUALITY: &[&str] = &[
    builtin::OBJECT,
    builtin::KERNEL,
    builtin::STRING,
    builtin::INTEGER,
    builtin::SYMBOL,
    builtin::TRUE_CLASS,
    builtin::FALSE_CLASS,
    builtin::NIL_CLASS,
];

const PREDICATE_REWRITES: &[PredicateRewrite] = &[
    PredicateRewrite {
        method: "is_a?",
        declared_in: OBJECT_LIKE,
        instance_only: true,
        kind: LogicKind::ReceiverIsArg,
    },
    PredicateRewrite {
        method: "kind_of?",
        declared_in: OBJECT_LIKE,
        instance_only: true,
        kind: LogicKind::ReceiverIsArg,
    },
    PredicateRewrite {
        method: "instance_of?",
        declared_in: OBJECT_LIKE,
        instance_only: true,
        kind: LogicKind::ReceiverIsArg,
    },
    PredicateRewrite {
        method: "nil?",
        declared_in: NIL_TESTS,
        instance_only: true,
        kind: LogicKind::ReceiverIsNil,
    },
    PredicateRewrite {
        method: "present?",
        declared_in: NIL_TESTS,
        instance_only: true,
        kind: LogicKind::ReceiverIsNotNil,
    },
    PredicateRewrite {
        method: "!",
        declared_in: NEGATION,
        instance_only: false,
        kind: LogicKind::Not,
    },
    PredicateRewrite {
        method: "===",
        declared_in: MODULE,
        instance_only: false,
        kind: LogicKind::ArgIsReceiver,
    },
    PredicateRewrite {
        method: "===",
        declared_in: LITERAL_EQUALITY,
        instance_only: false,
        kind: LogicKind::ArgEqualsReceiver,
    },
    PredicateRewrite {
        method: "<",
        declared_in: MODULE,
        instance_only: false,
        kind: LogicKind::ArgIsAncestor,
    },
    PredicateRewrite {
        method: "<=",
        declared_in: MODULE,
        instance_only: false,
        kind: LogicKind::ArgIsAncestor,
    },
];

/// The logic type a built-in predicate's return type is replaced with, if any.
pub fn logic_kind_for(method: &str, type_def: &TypeDef) -> Option<LogicKind> {
    PREDICATE_REWRITES
        .iter()
        .find(|rewrite| {
            rewrite.method == method
                && rewrite
                    .declared_in
                    .contains(&type_def.defined_in.as_str())
                && (!rewrite.instance_only || type_def.member_kind.is_instance())
        })
        .map(|rewrite| rewrite.kind)
}

pub(super) fn replace_primitive_method(
    method: &str,
    type_def: &TypeDef,
    method_type: MethodType,
) -> MethodType {
    match logic_kind_for(method, type_def) {
        Some(kind) => {
            trace!(method, defined_in = %type_def.defined_in, %kind, "predicate rewrite");
            method_type.with_return_type(Type::Logic(kind))
        }
        None => method_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::MemberKind;
    use crate::syntax::parse_method_type;
    use crate::types::TypeName;

    fn type_def(defined_in: &str, member_kind: MemberKind) -> TypeDef {
        TypeDef {
            method_type: parse_method_type("(untyped) -> bool").expect("parses"),
            defined_in: TypeName::new(defined_in),
            implemented_in: None,
            member_kind,
            member_name: "m".to_string(),
        }
    }

    #[test]
    fn module_and_value_equality_get_different_kinds() {
        assert_eq!(
            logic_kind_for("===", &type_def("::Module", MemberKind::Instance)),
            Some(LogicKind::ArgIsReceiver)
        );
        assert_eq!(
            logic_kind_for("===", &type_def("::String", MemberKind::Instance)),
            Some(LogicKind::ArgEqualsReceiver)
        );
        assert_eq!(
            logic_kind_for("===", &type_def("::Array", MemberKind::Instance)),
            None
        );
    }

    #[test]
    fn type_tests_require_instance_members() {
        assert_eq!(
            logic_kind_for("is_a?", &type_def("::Kernel", MemberKind::SingletonInstance)),
            Some(LogicKind::ReceiverIsArg)
        );
        assert_eq!(
            logic_kind_for("is_a?", &type_def("::Kernel", MemberKind::Singleton)),
            None
        );
        assert_eq!(
            logic_kind_for("!", &type_def("::NilClass", MemberKind::Singleton)),
            Some(LogicKind::Not)
        );
    }

    #[test]
    fn rewrite_replaces_only_the_return_type() {
        let def = type_def("::Object", MemberKind::Instance);
        let rewritten = replace_primitive_method("nil?", &def, def.method_type.clone());
        assert_eq!(rewritten.to_string(), "(untyped) -> logic(receiver_is_nil)");
        let untouched = replace_primitive_method("hash", &def, def.method_type.clone());
        assert_eq!(untouched, def.method_type);
    }
}
