mod common;

use common::*;
use jvm_mutator::classfile::{ACC_PUBLIC, ACC_STATIC, ClassFile};
use jvm_mutator::insn::opcodes::*;
use jvm_mutator::prescan::{
    DEFAULT_AVOIDED_CALLS, DEFAULT_EXCLUDED_ORIGINS, PreMutationAnalyser, PremutationClassInfo,
};

fn defaults() -> (Vec<String>, Vec<String>) {
    (
        DEFAULT_EXCLUDED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        DEFAULT_AVOIDED_CALLS.iter().map(|s| s.to_string()).collect(),
    )
}

fn analyse(bytes: &[u8]) -> PremutationClassInfo {
    let (origins, calls) = defaults();
    let class = ClassFile::parse(bytes).unwrap();
    PreMutationAnalyser::new(&origins, &calls).analyse(&class).unwrap()
}

// --- generated enum methods ---

#[test]
fn enum_compiler_methods_are_generated() {
    let info = analyse(&enum_class(false));
    let generated: Vec<_> = info.generated_enum_methods().collect();
    assert_eq!(
        generated,
        vec![
            ("<clinit>", "()V"),
            ("valueOf", "(Ljava/lang/String;)Lcom/example/Colour;"),
            ("values", "()[Lcom/example/Colour;"),
        ]
    );
    assert!(!info.is_generated_enum_method("<init>", "(Ljava/lang/String;I)V"));
    assert!(!info.is_generated_enum_method("register", "()V"));
}

#[test]
fn values_method_outside_an_enum_is_user_code() {
    let name = "com/example/Registry";
    let mut b = ClassBuilder::new(name, OBJECT);
    let init = default_constructor(&mut b, OBJECT);
    let body = Asm::new(1, 0).op(ACONST_NULL).op(ARETURN);
    let bytes = b
        .method(ACC_PUBLIC, "<init>", "()V", init)
        .method(ACC_PUBLIC | ACC_STATIC, "values", "()[Lcom/example/Registry;", body)
        .build();

    let info = analyse(&bytes);
    assert_eq!(info.generated_enum_methods().count(), 0);
}

// --- excluded origins ---

#[test]
fn groovy_markers_exclude_the_class() {
    let by_interface = marked_adder("com/example/Script", OBJECT, &["groovy/lang/GroovyObject"], &[]);
    assert!(analyse(&by_interface).is_excluded_origin());

    let by_closure = marked_adder(
        "com/example/Script$_run_closure1",
        "groovy/lang/Closure",
        &["org/codehaus/groovy/runtime/GeneratedClosure"],
        &[],
    );
    assert!(analyse(&by_closure).is_excluded_origin());

    let plain = marked_adder("com/example/Plain", OBJECT, &["java/io/Serializable"], &[]);
    assert!(!analyse(&plain).is_excluded_origin());
}

#[test]
fn markers_match_super_class_and_annotations() {
    let origins = vec!["com/example/Generated".to_string(), "kotlin/Metadata".to_string()];
    let none = Vec::new();
    let analyser = PreMutationAnalyser::new(&origins, &none);

    let by_super = marked_adder("com/example/Sub", "com/example/Generated", &[], &[]);
    let class = ClassFile::parse(&by_super).unwrap();
    assert!(analyser.analyse(&class).unwrap().is_excluded_origin());

    let by_annotation = marked_adder("com/example/Kt", OBJECT, &[], &["Lkotlin/Metadata;"]);
    let class = ClassFile::parse(&by_annotation).unwrap();
    assert!(analyser.analyse(&class).unwrap().is_excluded_origin());

    let unrelated = marked_adder("com/example/Other", OBJECT, &[], &["Ljava/lang/Deprecated;"]);
    let class = ClassFile::parse(&unrelated).unwrap();
    assert!(!analyser.analyse(&class).unwrap().is_excluded_origin());
}

// --- avoided calls ---

#[test]
fn logging_calls_mark_their_line() {
    let info = analyse(&logging_class());
    assert_eq!(info.avoided_lines().collect::<Vec<_>>(), vec![10]);
    assert!(info.is_avoided_line(10));
    assert!(!info.is_avoided_line(11));
}

#[test]
fn empty_avoid_list_marks_nothing() {
    let origins = Vec::new();
    let calls = Vec::new();
    let bytes = logging_class();
    let class = ClassFile::parse(&bytes).unwrap();
    let info = PreMutationAnalyser::new(&origins, &calls).analyse(&class).unwrap();
    assert_eq!(info.avoided_lines().count(), 0);
}

#[test]
fn classes_without_line_tables_have_no_avoided_lines() {
    let info = analyse(&adder_class("com/example/Plain"));
    assert_eq!(info, PremutationClassInfo::default());
}
