//! Benchmarks for the compilation pipeline.
//!
//! Measures the phases on generated class files:
//! - Class file parsing
//! - Per-method analysis, region rewriting and slot allocation
//! - A complete in-memory compilation against the runtime stubs

extern crate jvmaot;

#[path = "../tests/common/mod.rs"]
mod common;

use common::{op, Asm, ClassBuilder, Code, Handler, ACC_PUBLIC, ACC_STATIC};
use criterion::{criterion_group, criterion_main, Criterion};
use jvmaot::{
    alloc::allocate,
    analysis::analyze,
    classfile::parse_class,
    rewrite::{rewrite, trim_labels},
    CompilerConfig,
};
use std::hint::black_box;

/// A class with a counting loop and a guarded division.
fn workload() -> Vec<u8> {
    let mut asm = Asm::default();
    asm.op(op::ICONST_0)
        .op(op::ISTORE_1)
        .mark("loop")
        .op(op::ILOAD_1)
        .op(op::ILOAD_0)
        .branch(op::IF_ICMPGE, "end")
        .mark("try")
        .op_u8(op::BIPUSH, 100)
        .op(op::ILOAD_1)
        .op(op::IDIV)
        .op(op::POP)
        .mark("try_end")
        .branch(op::GOTO, "next")
        .mark("handler")
        .op(op::POP)
        .mark("next")
        .iinc(1, 1)
        .branch(op::GOTO, "loop")
        .mark("end")
        .op(op::ILOAD_1)
        .op(op::IRETURN);
    let mut code = Code::new(2, 2, asm.finish());
    code.handlers.push(Handler {
        start: asm.offset_of("try"),
        end: asm.offset_of("try_end"),
        handler: asm.offset_of("handler"),
        catch_type: Some("java/lang/ArithmeticException"),
    });

    let mut main = Asm::default();
    main.op(op::RETURN);
    ClassBuilder::object("app/Main")
        .default_constructor()
        .method(ACC_PUBLIC | ACC_STATIC, "count", "(I)I", Some(code))
        .method(
            ACC_PUBLIC | ACC_STATIC,
            "main",
            "([Ljava/lang/String;)V",
            Some(Code::new(0, 1, main.finish())),
        )
        .build()
}

/// Benchmark decoding one class file into descriptors.
fn bench_parse_class(c: &mut Criterion) {
    let data = workload();

    c.bench_function("parse_class", |b| {
        b.iter(|| {
            let parsed = parse_class(black_box(&data)).unwrap();
            black_box(parsed)
        });
    });
}

/// Benchmark the method passes on a freshly parsed method.
fn bench_method_passes(c: &mut Criterion) {
    let parsed = parse_class(&workload()).unwrap();
    let template = parsed
        .class
        .find_method_by_name("count", "(I)I")
        .unwrap()
        .clone();

    c.bench_function("method_passes", |b| {
        b.iter(|| {
            let mut method = template.clone();
            analyze(&mut method).unwrap();
            rewrite(&mut method).unwrap();
            trim_labels(&mut method);
            let plan = allocate(black_box(&method)).unwrap();
            black_box(plan)
        });
    });
}

/// Benchmark a full compilation, runtime stubs included.
fn bench_compile_in_memory(c: &mut Criterion) {
    let data = workload();

    c.bench_function("compile_in_memory", |b| {
        b.iter(|| {
            let mut compiler =
                common::compiler(vec![("app/Main", data.clone())], CompilerConfig::default());
            let (report, files) = compiler.compile_in_memory().unwrap();
            black_box((report, files))
        });
    });
}

criterion_group!(
    benches,
    bench_parse_class,
    bench_method_passes,
    bench_compile_in_memory
);
criterion_main!(benches);
