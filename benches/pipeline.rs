//! Full-pipeline benchmark on a synthetic loop-heavy routine.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use classir::ir::{BranchKind, ConstValue, ValueType};
use classir::lift::{BranchOperands, Insn, LabelId};
use classir::{Pipeline, Routine};

/// A routine with `loops` sequential counting loops feeding one accumulator,
/// exercising phi insertion, renaming, and coalescing in every loop.
fn looping_routine(loops: u32) -> Routine {
    let mut builder = Routine::builder("bench")
        .ret(ValueType::Int)
        .insn(Insn::Const(ConstValue::Int(0)))
        .insn(Insn::Store {
            slot: 0,
            ty: ValueType::Int,
        });

    for i in 0..loops {
        let header = i * 2;
        let done = i * 2 + 1;
        builder = builder
            .insn(Insn::Const(ConstValue::Int(0)))
            .insn(Insn::Store {
                slot: 1,
                ty: ValueType::Int,
            })
            .label(header)
            .insn(Insn::Load {
                slot: 1,
                ty: ValueType::Int,
            })
            .insn(Insn::Const(ConstValue::Int(100)))
            .insn(Insn::Branch {
                kind: BranchKind::Ge,
                operands: BranchOperands::IntInt,
                target: LabelId(done),
            })
            .insn(Insn::Load {
                slot: 0,
                ty: ValueType::Int,
            })
            .insn(Insn::Load {
                slot: 1,
                ty: ValueType::Int,
            })
            .insn(Insn::Binary {
                op: classir::ir::BinaryOp::Add,
                ty: ValueType::Int,
            })
            .insn(Insn::Store {
                slot: 0,
                ty: ValueType::Int,
            })
            .insn(Insn::Inc { slot: 1, amount: 1 })
            .insn(Insn::Goto {
                target: LabelId(header),
            })
            .label(done);
    }

    builder
        .insn(Insn::Load {
            slot: 0,
            ty: ValueType::Int,
        })
        .insn(Insn::Return { ty: ValueType::Int })
        .build()
}

fn bench_pipeline(c: &mut Criterion) {
    let pipeline = Pipeline::default();

    let mut group = c.benchmark_group("pipeline");
    for loops in [1u32, 8, 32] {
        let routine = looping_routine(loops);
        group.bench_function(format!("loops_{loops}"), |b| {
            b.iter(|| {
                let graph = pipeline.run(black_box(&routine)).unwrap();
                black_box(graph)
            });
        });
    }
    group.finish();

    let routines: Vec<Routine> = (0..64)
        .map(|i| {
            let mut routine = looping_routine(4);
            routine.name = format!("bench_{i}");
            routine
        })
        .collect();
    c.bench_function("pipeline_batch_64", |b| {
        b.iter(|| {
            let results = pipeline.run_all(black_box(&routines)).unwrap();
            black_box(results)
        });
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
