//! End-to-end tests: class files in, analyzed pool, emulated executions and rendered
//! sources out.

mod common;

use common::{op, Asm, ClassBuilder, Code, Handler, ACC_PUBLIC, ACC_STATIC};
use jvmaot::{
    dependencies::{collect, DependencyRoots},
    emulation::{compare_plans, Effect, EmValue, EmulationConfig, Interpreter, Outcome, PlanMode},
    ir::MethodSignature,
    CompilerConfig, Error,
};

fn main_method(builder: ClassBuilder) -> ClassBuilder {
    let mut asm = Asm::default();
    asm.op(op::RETURN);
    builder.method(
        ACC_PUBLIC | ACC_STATIC,
        "main",
        "([Ljava/lang/String;)V",
        Some(Code::new(0, 1, asm.finish())),
    )
}

/// `static int add(int a, int b) { return a + b; }`
fn adder() -> Vec<u8> {
    let mut asm = Asm::default();
    asm.op(op::ILOAD_0).op(op::ILOAD_1).op(op::IADD).op(op::IRETURN);
    let builder = ClassBuilder::object("app/Main").method(
        ACC_PUBLIC | ACC_STATIC,
        "add",
        "(II)I",
        Some(Code::new(2, 2, asm.finish())),
    );
    main_method(builder).build()
}

/// `static int sum(int n) { int s = 0; for (int i = 0; i < n; i++) s += i * i; return s; }`
fn summing(builder: ClassBuilder) -> ClassBuilder {
    let mut asm = Asm::default();
    asm.op(op::ICONST_0)
        .op(op::ISTORE_1)
        .op(op::ICONST_0)
        .op_u8(op::ISTORE, 2)
        .mark("cond")
        .op_u8(op::ILOAD, 2)
        .op(op::ILOAD_0)
        .branch(op::IF_ICMPGE, "end")
        .op(op::ILOAD_1)
        .op_u8(op::ILOAD, 2)
        .op(op::DUP)
        .op(op::IMUL)
        .op(op::IADD)
        .op(op::ISTORE_1)
        .iinc(2, 1)
        .branch(op::GOTO, "cond")
        .mark("end")
        .op(op::ILOAD_1)
        .op(op::IRETURN);
    builder.method(
        ACC_PUBLIC | ACC_STATIC,
        "sum",
        "(I)I",
        Some(Code::new(3, 3, asm.finish())),
    )
}

/// ```java
/// static int f(int x) {
///     try {
///         try { x = 10 / x; } catch (ArithmeticException e) { x = -1; return x; }
///         x++;
///     } catch (Throwable t) { x = -2; }
///     return x;
/// }
/// ```
///
/// The inner handler jumps straight to the shared return, leaving the outer region.
fn nested_try(builder: ClassBuilder) -> ClassBuilder {
    let mut asm = Asm::default();
    asm.mark("try")
        .op_u8(op::BIPUSH, 10)
        .op(op::ILOAD_0)
        .op(op::IDIV)
        .op(op::ISTORE_0)
        .mark("inner_end")
        .branch(op::GOTO, "after_inner")
        .mark("inner_handler")
        .op(op::POP)
        .op(op::ICONST_M1)
        .op(op::ISTORE_0)
        .branch(op::GOTO, "done")
        .mark("after_inner")
        .iinc(0, 1)
        .mark("outer_end")
        .branch(op::GOTO, "done")
        .mark("outer_handler")
        .op(op::POP)
        .op_u8(op::BIPUSH, (-2i8) as u8)
        .op(op::ISTORE_0)
        .mark("done")
        .op(op::ILOAD_0)
        .op(op::IRETURN);

    let mut code = Code::new(2, 1, asm.finish());
    code.handlers = vec![
        Handler {
            start: asm.offset_of("try"),
            end: asm.offset_of("inner_end"),
            handler: asm.offset_of("inner_handler"),
            catch_type: Some("java/lang/ArithmeticException"),
        },
        Handler {
            start: asm.offset_of("try"),
            end: asm.offset_of("outer_end"),
            handler: asm.offset_of("outer_handler"),
            catch_type: None,
        },
    ];
    builder.method(ACC_PUBLIC | ACC_STATIC, "f", "(I)I", Some(code))
}

fn returning_text(name: &str, text: &str) -> Vec<u8> {
    let mut builder = ClassBuilder::new(
        name,
        Some(if name == "pkg/A" { "java/lang/Object" } else { "pkg/A" }),
    )
    .default_constructor();
    let literal = builder.pool.string(text);
    let mut asm = Asm::default();
    asm.op_u8(op::LDC, literal as u8).op(op::ARETURN);
    builder
        .method(
            ACC_PUBLIC,
            "toString",
            "()Ljava/lang/String;",
            Some(Code::new(1, 1, asm.finish())),
        )
        .build()
}

/// `Main.describe() { A a = new B(); return a.toString(); }` plus `A` and `B extends A`.
fn dispatching() -> Vec<(&'static str, Vec<u8>)> {
    let mut builder = ClassBuilder::object("app/Main");
    let class_b = builder.pool.class("pkg/B");
    let init_b = builder.pool.method("pkg/B", "<init>", "()V");
    let to_string = builder.pool.method("pkg/A", "toString", "()Ljava/lang/String;");
    let mut asm = Asm::default();
    asm.op_u16(op::NEW, class_b)
        .op(op::DUP)
        .op_u16(op::INVOKESPECIAL, init_b)
        .op_u16(op::INVOKEVIRTUAL, to_string)
        .op(op::ARETURN);
    builder = builder.method(
        ACC_PUBLIC | ACC_STATIC,
        "describe",
        "()Ljava/lang/String;",
        Some(Code::new(2, 0, asm.finish())),
    );
    vec![
        ("app/Main", main_method(builder).build()),
        ("pkg/A", returning_text("pkg/A", "A")),
        ("pkg/B", returning_text("pkg/B", "B")),
    ]
}

/// ```java
/// int v;
///
/// static int shuffle(int x) {
///     Main m = new Main();
///     m.v = x;
///     return m.v = m.v + 18;
/// }
/// ```
///
/// Lowered with explicit `dup_x1` / `swap` / `pop` shuffles and a reused object local, so the
/// receiver lives in stack slots across both field writes.
fn shuffling(builder: ClassBuilder) -> ClassBuilder {
    let mut builder = builder.default_constructor().field(0, "v", "I");
    let class_main = builder.pool.class("app/Main");
    let init = builder.pool.method("app/Main", "<init>", "()V");
    let field = builder.pool.field("app/Main", "v", "I");
    let mut asm = Asm::default();
    asm.op(op::ILOAD_0)
        .op_u16(op::NEW, class_main)
        .op(op::DUP)
        .op_u16(op::INVOKESPECIAL, init)
        .op(op::DUP_X1)
        .op(op::SWAP)
        .op_u16(op::PUTFIELD, field)
        .op(op::ASTORE_1)
        .op(op::ALOAD_1)
        .op(op::ALOAD_1)
        .op(op::ALOAD_1)
        .op_u16(op::GETFIELD, field)
        .op_u8(op::BIPUSH, 18)
        .op(op::IADD)
        .op(op::DUP_X1)
        .op_u16(op::PUTFIELD, field)
        .op(op::SWAP)
        .op(op::POP)
        .op(op::IRETURN);
    builder.method(
        ACC_PUBLIC | ACC_STATIC,
        "shuffle",
        "(I)I",
        Some(Code::new(4, 2, asm.finish())),
    )
}

/// Field reads and writes of an execution, in order, as `(is_write, name, value)`.
fn field_effects(effects: &[Effect]) -> Vec<(bool, String, EmValue)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::FieldRead { name, value, .. } => Some((false, name.clone(), *value)),
            Effect::FieldWrite { name, value, .. } => Some((true, name.clone(), *value)),
            _ => None,
        })
        .collect()
}

fn file<'a>(files: &'a [jvmaot::emit::EmittedFile], path: &str) -> &'a str {
    files
        .iter()
        .find(|file| file.path.to_str() == Some(path))
        .map(|file| file.contents.as_str())
        .unwrap_or_else(|| panic!("{path} was not rendered"))
}

#[test]
fn test_static_add_compiles_and_runs() {
    let mut compiler = common::compiler(vec![("app/Main", adder())], CompilerConfig::default());
    let mut compilation = compiler.prepare().unwrap();
    assert_eq!(compilation.report.main_class.as_deref(), Some("app/Main"));
    assert!(compilation.report.excluded.is_empty());
    assert!(compilation.report.missing.is_empty());

    let add = compilation
        .pool
        .get("app/Main")
        .unwrap()
        .find_method_by_name("add", "(II)I")
        .unwrap();
    assert_eq!(add.max_locals, 2);
    let iadd = add
        .instructions
        .iter()
        .filter(|instruction| !instruction.is_pseudo())
        .nth(2)
        .unwrap();
    let io = iadd.io().unwrap();
    assert_eq!((io.inputs.len(), io.outputs.len()), (2, 1));

    let mut interpreter = Interpreter::new(&compilation.pool, EmulationConfig::with_mode(PlanMode::Stored));
    let execution = interpreter
        .call("app/Main", "add", "(II)I", &[EmValue::Int(2), EmValue::Int(3)])
        .unwrap();
    assert_eq!(execution.outcome, Outcome::Returned(Some(EmValue::Int(5))));

    let files = compilation.emit().unwrap();
    assert_eq!(compilation.report.files, files.len());
    assert!(file(&files, "main.cpp").contains("runVM(SM_app_Main_main_Array1_java_lang_String);"));
    assert!(file(&files, "app_Main.cpp").contains("SM_app_Main_add_"));
    assert!(file(&files, "app_Main.h").contains("SM_app_Main_add_"));
    assert!(files.iter().all(|file| file.path.to_str() != Some("java_lang_Object.h")));
}

#[test]
fn test_virtual_dispatch_uses_override() {
    let mut compiler = common::compiler(dispatching(), CompilerConfig::default());
    let mut compilation = compiler.prepare().unwrap();
    assert!(compilation.report.excluded.is_empty());

    {
        let signature = MethodSignature::new("toString", "()Ljava/lang/String;").unwrap();
        let pool = &compilation.pool;
        let a = pool.get("pkg/A").unwrap();
        let b = pool.get("pkg/B").unwrap();
        assert_eq!(a.vtable_slot(&signature), Some(4));
        assert_eq!(b.vtable_slot(&signature), Some(4));
        assert_eq!(a.vtable[4].owner, "pkg/A");
        assert_eq!(b.vtable[4].owner, "pkg/B");
        assert!(!b.vtable[4].is_abstract);

        let mut interpreter = Interpreter::new(pool, EmulationConfig::with_mode(PlanMode::Stored));
        let execution = interpreter
            .call("app/Main", "describe", "()Ljava/lang/String;", &[])
            .unwrap();
        let Some(EmValue::Ref(Some(text))) = execution.outcome.value() else {
            panic!("unexpected outcome {:?}", execution.outcome);
        };
        assert_eq!(interpreter.heap().text(text), Some("B"));
        assert!(execution.effects.iter().any(|effect| matches!(
            effect,
            Effect::Call { method, .. } if method.starts_with("pkg/B.toString")
        )));
        assert!(!execution.effects.iter().any(|effect| matches!(
            effect,
            Effect::Call { method, .. } if method.starts_with("pkg/A.toString")
        )));
    }

    let files = compilation.emit().unwrap();
    assert!(file(&files, "pkg_B.h").contains("#define VTABLE_pkg_B_toString_R_java_lang_String 4"));
    let source = file(&files, "pkg_B.cpp");
    let table = &source[source.find("static void *vtable_pkg_B[] {").unwrap()..];
    let slots: Vec<&str> = table
        .lines()
        .skip(1)
        .take_while(|line| !line.starts_with("};"))
        .map(str::trim)
        .collect();
    assert_eq!(slots[4], "(void *) M_pkg_B_toString_R_java_lang_String,");
}

#[test]
fn test_failing_static_initializer_is_wrapped() {
    let mut builder = ClassBuilder::object("app/Main").field(ACC_STATIC, "ratio", "I");
    let ratio = builder.pool.field("app/Main", "ratio", "I");
    let mut asm = Asm::default();
    asm.op(op::ICONST_1)
        .op(op::ICONST_0)
        .op(op::IDIV)
        .op_u16(op::PUTSTATIC, ratio)
        .op(op::RETURN);
    builder = builder.method(ACC_STATIC, "<clinit>", "()V", Some(Code::new(2, 0, asm.finish())));
    let mut add = Asm::default();
    add.op(op::ILOAD_0).op(op::ILOAD_1).op(op::IADD).op(op::IRETURN);
    builder = builder.method(
        ACC_PUBLIC | ACC_STATIC,
        "add",
        "(II)I",
        Some(Code::new(2, 2, add.finish())),
    );

    let mut compiler = common::compiler(
        vec![("app/Main", main_method(builder).build())],
        CompilerConfig::default(),
    );
    let mut compilation = compiler.prepare().unwrap();

    {
        let mut interpreter =
            Interpreter::new(&compilation.pool, EmulationConfig::with_mode(PlanMode::Stored));
        let execution = interpreter
            .call("app/Main", "add", "(II)I", &[EmValue::Int(1), EmValue::Int(2)])
            .unwrap();
        assert!(matches!(execution.outcome, Outcome::Threw(_)));
        assert_eq!(
            execution.effects,
            vec![
                Effect::Throw {
                    class: "java/lang/ArithmeticException".to_string()
                },
                Effect::Throw {
                    class: "java/lang/ExceptionInInitializerError".to_string()
                },
            ]
        );
    }

    let files = compilation.emit().unwrap();
    let source = file(&files, "app_Main.cpp");
    assert!(source.contains("static void clinitBody_app_Main(jcontext ctx) {"));
    assert!(source.contains("    clinitBody_app_Main(ctx);\n"));
    assert!(source.contains(
        "init_java_lang_ExceptionInInitializerError_java_lang_Throwable(ctx, frame[1].o, frame[0].o);"
    ));
}

#[test]
fn test_nested_regions_share_one_bypass_flag() {
    let main = main_method(nested_try(ClassBuilder::object("app/Main"))).build();
    let mut compiler = common::compiler(vec![("app/Main", main)], CompilerConfig::default());
    let compilation = compiler.prepare().unwrap();

    let f = compilation
        .pool
        .get("app/Main")
        .unwrap()
        .find_method_by_name("f", "(I)I")
        .unwrap();
    assert_eq!(f.bypass_count, 1);
    assert!(compilation.report.stats.get("bypass_flags").is_some_and(|flags| *flags >= 1));

    let mut interpreter = Interpreter::new(&compilation.pool, EmulationConfig::with_mode(PlanMode::Stored));
    let thrown = interpreter.call("app/Main", "f", "(I)I", &[EmValue::Int(0)]).unwrap();
    assert_eq!(
        thrown.effects,
        vec![
            Effect::Enter(1),
            Effect::Enter(0),
            Effect::Throw {
                class: "java/lang/ArithmeticException".to_string()
            },
            Effect::Exit(1),
            Effect::Return(Some(EmValue::Int(-1))),
        ]
    );

    let normal = interpreter.call("app/Main", "f", "(I)I", &[EmValue::Int(1)]).unwrap();
    assert_eq!(
        normal.effects,
        vec![
            Effect::Enter(1),
            Effect::Enter(0),
            Effect::Exit(0),
            Effect::Exit(1),
            Effect::Return(Some(EmValue::Int(11))),
        ]
    );
}

#[test]
fn test_raw_and_allocated_plans_agree() {
    let main = main_method(summing(nested_try(ClassBuilder::object("app/Main")))).build();
    let mut compiler = common::compiler(vec![("app/Main", main)], CompilerConfig::default());
    let compilation = compiler.prepare().unwrap();

    let sum = compare_plans(&compilation.pool, "app/Main", "sum", "(I)I", &[EmValue::Int(4)]).unwrap();
    assert!(sum.is_equivalent(), "diverged at {:?}", sum.first_difference());
    assert_eq!(sum.raw.outcome.value(), Some(EmValue::Int(14)));

    for input in [0, 1, 5] {
        let f = compare_plans(&compilation.pool, "app/Main", "f", "(I)I", &[EmValue::Int(input)]).unwrap();
        assert!(f.is_equivalent(), "f({input}) diverged at {:?}", f.first_difference());
    }
}

#[test]
fn test_object_shuffles_keep_field_order() {
    let main = main_method(shuffling(ClassBuilder::object("app/Main"))).build();
    let mut compiler = common::compiler(vec![("app/Main", main)], CompilerConfig::default());
    let compilation = compiler.prepare().unwrap();

    for (input, expected) in [(5, 23), (-18, 0)] {
        let comparison =
            compare_plans(&compilation.pool, "app/Main", "shuffle", "(I)I", &[EmValue::Int(input)])
                .unwrap();
        assert!(
            comparison.is_equivalent(),
            "shuffle({input}) diverged at {:?}",
            comparison.first_difference()
        );
        assert_eq!(comparison.raw.outcome.value(), Some(EmValue::Int(expected)));
        assert_eq!(comparison.allocated.outcome.value(), Some(EmValue::Int(expected)));

        let expected_fields = vec![
            (true, "v".to_string(), EmValue::Int(input)),
            (false, "v".to_string(), EmValue::Int(input)),
            (true, "v".to_string(), EmValue::Int(expected)),
        ];
        assert_eq!(field_effects(&comparison.raw.effects), expected_fields);
        assert_eq!(field_effects(&comparison.allocated.effects), expected_fields);
    }
}

#[test]
fn test_unoptimized_plans_keep_results() {
    let main = main_method(summing(ClassBuilder::object("app/Main"))).build();
    let config = CompilerConfig::default().with_optimizations(false);
    let mut compiler = common::compiler(vec![("app/Main", main)], config);
    let compilation = compiler.prepare().unwrap();

    let sum = compilation
        .pool
        .get("app/Main")
        .unwrap()
        .find_method_by_name("sum", "(I)I")
        .unwrap();
    assert!(sum.plan.as_ref().unwrap().runs.is_empty());

    let mut interpreter = Interpreter::new(&compilation.pool, EmulationConfig::with_mode(PlanMode::Stored));
    let execution = interpreter.call("app/Main", "sum", "(I)I", &[EmValue::Int(5)]).unwrap();
    assert_eq!(execution.outcome.value(), Some(EmValue::Int(30)));
}

#[test]
fn test_closure_follows_references_only() {
    let main = main_method(ClassBuilder::object("app/Main").field(0, "foo", "Lapp/Foo;")).build();
    let classes = vec![
        ("app/Main", main),
        ("app/Foo", ClassBuilder::new("app/Foo", Some("app/Bar")).build()),
        ("app/Bar", ClassBuilder::object("app/Bar").build()),
        ("app/Unused", ClassBuilder::object("app/Unused").build()),
    ];
    let mut compiler = common::compiler(classes, CompilerConfig::default());
    let mut compilation = compiler.prepare().unwrap();

    let mut expected: Vec<String> = common::runtime_names();
    expected.extend(["app/Main", "app/Foo", "app/Bar"].map(String::from));
    expected.sort();
    let actual: Vec<String> = compilation.closure.classes.iter().cloned().collect();
    assert_eq!(actual, expected);
    assert_eq!(compilation.report.classes, expected.len());

    let roots = DependencyRoots::runtime(Some("app/Main"));
    let again = collect(&mut compilation.pool, &roots).unwrap();
    assert_eq!(again, compilation.closure);
}

#[test]
fn test_reflective_patterns_retain_classes() {
    let classes = vec![
        ("app/Main", adder()),
        ("app/Unused", ClassBuilder::object("app/Unused").build()),
    ];
    let config = CompilerConfig::from_json(r#"{ "reflective": ["app.Unused"] }"#).unwrap();
    let mut compiler = common::compiler(classes, config);
    let compilation = compiler.prepare().unwrap();

    assert!(compilation.closure.contains("app/Unused"));
    assert!(compilation.pool.get("app/Unused").unwrap().reflective);
    assert!(!compilation.pool.get("app/Main").unwrap().reflective);
}

#[test]
fn test_unresolvable_classes_are_excluded() {
    let main = main_method(ClassBuilder::object("app/Main").field(0, "orphan", "Lapp/Orphan;")).build();
    let classes = vec![
        ("app/Main", main),
        ("app/Orphan", ClassBuilder::new("app/Orphan", Some("lib/Missing")).build()),
    ];
    let mut compiler = common::compiler(classes, CompilerConfig::default());
    let (report, files) = compiler.compile_in_memory().unwrap();

    assert_eq!(report.excluded, vec!["app/Orphan".to_string()]);
    assert!(report.missing.contains(&"app/Orphan".to_string()));
    assert!(files.iter().all(|file| !file.path.to_string_lossy().contains("Orphan")));
}

#[test]
fn test_first_source_wins() {
    let mut first = ClassBuilder::object("app/Main");
    first = first.field(ACC_STATIC, "first", "I");
    let second = ClassBuilder::object("app/Main").field(ACC_STATIC, "second", "I");
    let classes = vec![
        ("app/Main", main_method(first).build()),
        ("app/Main", main_method(second).build()),
    ];
    let mut compiler = common::compiler(classes, CompilerConfig::default());
    let compilation = compiler.prepare().unwrap();

    let main = compilation.pool.get("app/Main").unwrap();
    assert!(main.find_field("first").is_some());
    assert!(main.find_field("second").is_none());
}

#[test]
fn test_missing_runtime_class_fails() {
    let mut compiler = jvmaot::Compiler::new(CompilerConfig::default());
    compiler.add_source(jvmaot::ClassSource::Memory {
        name: "app/Main.class".into(),
        data: adder(),
    });
    assert!(matches!(compiler.prepare(), Err(Error::MissingClass(_))));
}

#[test]
fn test_run_writes_project() {
    let config = CompilerConfig {
        generate_project_files: true,
        ..CompilerConfig::default()
    };
    let mut compiler = common::compiler(vec![("app/Main", adder())], config);
    let dir = tempfile::tempdir().unwrap();
    let report = compiler.run(dir.path()).unwrap();

    assert!(report.files > 0);
    assert!(dir.path().join("main.cpp").is_file());
    assert!(dir.path().join("Config.h").is_file());
    assert!(dir.path().join("app_Main.cpp").is_file());
    let script = std::fs::read_to_string(dir.path().join("CMakeLists.txt")).unwrap();
    assert!(script.contains("app_Main.cpp"));
}

#[test]
fn test_jar_source_with_fragment() {
    use std::io::Write;
    use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

    let dir = tempfile::tempdir().unwrap();
    let jar = dir.path().join("app.jar");
    let mut writer = ZipWriter::new(std::fs::File::create(&jar).unwrap());
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("app/Main.class", deflated).unwrap();
    writer.write_all(&adder()).unwrap();
    writer.start_file("app/Extra.class", deflated).unwrap();
    writer.write_all(&ClassBuilder::object("app/Extra").build()).unwrap();
    writer
        .start_file("jvmaot.json", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(br#"{ "reflective": ["app.Extra"] }"#).unwrap();
    writer.finish().unwrap();

    let mut compiler = common::compiler(Vec::new(), CompilerConfig::default());
    compiler.add_source(jvmaot::ClassSource::from_path(&jar));
    let compilation = compiler.prepare().unwrap();

    assert_eq!(compilation.report.main_class.as_deref(), Some("app/Main"));
    assert!(compilation.closure.contains("app/Extra"));
    assert!(compilation.pool.get("app/Extra").unwrap().reflective);
}
