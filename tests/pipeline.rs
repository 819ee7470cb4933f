//! End-to-end tests over the public pipeline surface.

use std::collections::HashMap;
use std::sync::Arc;

use classir::flow::FlowGraph;
use classir::ir::{
    BranchKind, ConstValue, Expr, Local, LocalKind, Stmt, ValueType, VersionedLocal,
};
use classir::lift::{lift, naturalize, BranchOperands, Insn, StrictVerifier};
use classir::ssa::construct;
use classir::{Error, Pipeline, PipelineConfig, Routine};

/// Follows constant values through straight-line copies, by frame slot.
fn eval_consts(graph: &FlowGraph) -> HashMap<Local, i64> {
    let mut env: HashMap<(Local, Option<u32>), i64> = HashMap::new();
    let mut result = HashMap::new();

    fn eval(expr: &Expr, env: &HashMap<(Local, Option<u32>), i64>) -> Option<i64> {
        match expr {
            Expr::Const(ConstValue::Int(v)) => Some(i64::from(*v)),
            Expr::Const(ConstValue::Long(v)) => Some(*v),
            Expr::Load(v) => env.get(&(v.local, v.version)).copied(),
            _ => None,
        }
    }

    for id in graph.blocks_in_order() {
        let Some(block) = graph.block(id) else {
            continue;
        };
        for stmt in block.stmts() {
            if let Stmt::Copy { dest, src, .. } = stmt {
                if let Some(value) = eval(src, &env) {
                    env.insert((dest.local, dest.version), value);
                    if dest.local.kind == LocalKind::Slot {
                        result.insert(dest.local, value);
                    }
                }
            }
        }
    }
    result
}

/// `i = 0; while (i < 10) i += 1; return i;`
fn counting_routine() -> Routine {
    Routine::builder("count")
        .ret(ValueType::Int)
        .insn(Insn::Const(ConstValue::Int(0)))
        .insn(Insn::Store {
            slot: 0,
            ty: ValueType::Int,
        })
        .label(0)
        .insn(Insn::Load {
            slot: 0,
            ty: ValueType::Int,
        })
        .insn(Insn::Const(ConstValue::Int(10)))
        .insn(Insn::Branch {
            kind: BranchKind::Ge,
            operands: BranchOperands::IntInt,
            target: classir::lift::LabelId(1),
        })
        .insn(Insn::Inc { slot: 0, amount: 1 })
        .insn(Insn::Goto {
            target: classir::lift::LabelId(0),
        })
        .label(1)
        .insn(Insn::Load {
            slot: 0,
            ty: ValueType::Int,
        })
        .insn(Insn::Return { ty: ValueType::Int })
        .build()
}

fn dup_x1_routine(ret: ValueType) -> Routine {
    // [v1, v0] with v0 on top becomes [v0, v1, v0].
    let mut builder = Routine::builder("shuffle")
        .ret(ret)
        .label(0)
        .insn(Insn::Const(ConstValue::Int(1)))
        .insn(Insn::Const(ConstValue::Int(2)))
        .insn(Insn::DupX1)
        .insn(Insn::Store {
            slot: 0,
            ty: ValueType::Int,
        })
        .insn(Insn::Store {
            slot: 1,
            ty: ValueType::Int,
        })
        .insn(Insn::Store {
            slot: 2,
            ty: ValueType::Int,
        });
    if ret == ValueType::Int {
        builder = builder.insn(Insn::Load {
            slot: 1,
            ty: ValueType::Int,
        });
    }
    builder.insn(Insn::Return { ty: ret }).build()
}

#[test]
fn test_dup_x1_slot_values_after_lift() {
    let pipeline = Pipeline::new(PipelineConfig {
        naturalize: true,
        ssa: false,
        verifier: Arc::new(StrictVerifier),
    });
    let graph = pipeline.run(&dup_x1_routine(ValueType::Void)).unwrap();
    let values = eval_consts(&graph);
    assert_eq!(values.get(&Local::slot(0)), Some(&2));
    assert_eq!(values.get(&Local::slot(1)), Some(&1));
    assert_eq!(values.get(&Local::slot(2)), Some(&2));
}

#[test]
fn test_dup_x1_middle_slot_folds_through_pipeline() {
    // Returning the middle slot after the shuffle yields the buried value.
    let graph = Pipeline::default().run(&dup_x1_routine(ValueType::Int)).unwrap();
    let returns: Vec<&Stmt> = graph
        .blocks()
        .flat_map(|(_, b)| b.stmts())
        .filter(|s| matches!(s, Stmt::Return { .. }))
        .collect();
    assert_eq!(returns.len(), 1);
    assert!(matches!(
        returns[0],
        Stmt::Return {
            value: Some(Expr::Const(ConstValue::Int(1))),
        }
    ));
}

#[test]
fn test_stack_height_mismatch_is_fatal() {
    // One path reaches the join with two operands, the other with one.
    let routine = Routine::builder("broken")
        .insn(Insn::Const(ConstValue::Int(0)))
        .insn(Insn::Branch {
            kind: BranchKind::Eq,
            operands: BranchOperands::IntZero,
            target: classir::lift::LabelId(1),
        })
        .insn(Insn::Const(ConstValue::Int(1)))
        .insn(Insn::Const(ConstValue::Int(2)))
        .insn(Insn::Goto {
            target: classir::lift::LabelId(2),
        })
        .label(1)
        .insn(Insn::Const(ConstValue::Int(3)))
        .label(2)
        .insn(Insn::Pop { wide: false })
        .insn(Insn::Return {
            ty: ValueType::Void,
        })
        .build();

    assert!(matches!(
        Pipeline::default().run(&routine),
        Err(Error::Malformed { .. })
    ));
}

#[test]
fn test_naturalize_is_idempotent() {
    let routine = counting_routine();
    let mut graph = lift(&routine, &StrictVerifier).unwrap();
    naturalize(&mut graph).unwrap();
    let first = graph.to_dot();
    naturalize(&mut graph).unwrap();
    assert_eq!(graph.to_dot(), first);
}

#[test]
fn test_ssa_form_has_unique_dominating_defs() {
    let routine = counting_routine();
    let mut graph = lift(&routine, &StrictVerifier).unwrap();
    naturalize(&mut graph).unwrap();
    construct(&mut graph).unwrap();

    // Every version is defined exactly once.
    let mut def_site = HashMap::new();
    for (id, block) in graph.blocks() {
        for (at, stmt) in block.stmts().iter().enumerate() {
            for dest in stmt.defined_vars() {
                let version = dest.version.expect("unversioned definition");
                let vl = VersionedLocal::new(dest.local, version);
                assert!(
                    def_site.insert(vl, (id, at)).is_none(),
                    "{vl} defined twice"
                );
            }
        }
    }

    // Every use is reached by its definition.
    let dom = graph.dominators().unwrap();
    for (id, block) in graph.blocks() {
        for (at, stmt) in block.stmts().iter().enumerate() {
            if let Stmt::Phi { args, .. } = stmt {
                for (pred, arg) in args {
                    let vl = VersionedLocal::new(arg.local, arg.version.unwrap());
                    let (def_block, _) = def_site[&vl];
                    assert!(dom.dominates(def_block, *pred));
                }
                continue;
            }
            stmt.for_each_load(&mut |v| {
                let vl = VersionedLocal::new(v.local, v.version.expect("unversioned use"));
                let (def_block, def_at) = def_site[&vl];
                if def_block == id {
                    assert!(def_at <= at, "{vl} used before its definition");
                } else {
                    assert!(dom.dominates(def_block, id), "{vl} use not dominated");
                }
            });
        }
    }
}

#[test]
fn test_full_pipeline_erases_ssa_artifacts() {
    let graph = Pipeline::default().run(&counting_routine()).unwrap();

    let mut saw_branch = false;
    for (_, block) in graph.blocks() {
        for stmt in block.stmts() {
            assert!(!stmt.is_phi());
            assert!(!matches!(stmt, Stmt::ParallelCopy { .. }));
            for dest in stmt.defined_vars() {
                assert!(dest.version.is_none());
            }
            stmt.for_each_load(&mut |v| assert!(v.version.is_none()));
            saw_branch |= matches!(stmt, Stmt::Branch { .. });
        }
    }
    assert!(saw_branch, "loop condition lost");
}

#[test]
fn test_field_load_folds_into_return() {
    let routine = Routine::builder("getter")
        .ret(ValueType::Int)
        .insn(Insn::FieldLoad {
            is_static: true,
            owner: "Config".into(),
            name: "limit".into(),
            ty: ValueType::Int,
        })
        .insn(Insn::Store {
            slot: 0,
            ty: ValueType::Int,
        })
        .insn(Insn::Load {
            slot: 0,
            ty: ValueType::Int,
        })
        .insn(Insn::Return { ty: ValueType::Int })
        .build();

    let graph = Pipeline::default().run(&routine).unwrap();
    assert_eq!(graph.block_count(), 1);
    let block = graph.block(graph.entry().unwrap()).unwrap();
    assert_eq!(block.len(), 1);
    assert!(matches!(
        &block.stmts()[0],
        Stmt::Return {
            value: Some(Expr::FieldLoad { name, .. }),
        } if name == "limit"
    ));
}

#[test]
fn test_invocation_result_not_duplicated() {
    // The call's value is used twice, so its definition must survive.
    let routine = Routine::builder("twice")
        .ret(ValueType::Int)
        .insn(Insn::Invoke {
            kind: classir::ir::InvokeKind::Static,
            owner: "Source".into(),
            name: "next".into(),
            params: Vec::new(),
            ret: ValueType::Int,
        })
        .insn(Insn::Dup)
        .insn(Insn::Binary {
            op: classir::ir::BinaryOp::Add,
            ty: ValueType::Int,
        })
        .insn(Insn::Return { ty: ValueType::Int })
        .build();

    let graph = Pipeline::default().run(&routine).unwrap();
    let mut calls = 0;
    for (_, block) in graph.blocks() {
        for stmt in block.stmts() {
            for expr in stmt.exprs() {
                if expr.any(|e| matches!(e, Expr::Invoke { .. })) {
                    calls += 1;
                }
            }
        }
    }
    assert_eq!(calls, 1, "invocation was duplicated or dropped");
}

#[test]
fn test_exception_ranges_survive_pipeline() {
    let routine = Routine::builder("guarded")
        .ret(ValueType::Int)
        .label(0)
        .insn(Insn::Invoke {
            kind: classir::ir::InvokeKind::Static,
            owner: "Risky".into(),
            name: "op".into(),
            params: Vec::new(),
            ret: ValueType::Void,
        })
        .label(1)
        .insn(Insn::Const(ConstValue::Int(1)))
        .insn(Insn::Return { ty: ValueType::Int })
        .label(2)
        .insn(Insn::Pop { wide: false })
        .insn(Insn::Const(ConstValue::Int(0)))
        .insn(Insn::Return { ty: ValueType::Int })
        .try_catch(0, 1, 2, Some("java/lang/Exception"))
        .build();

    let graph = Pipeline::default().run(&routine).unwrap();
    assert!(!graph.ranges().is_empty(), "exception range lost");
    assert!(graph.ranges().iter().all(|r| !r.blocks().is_empty()));

    // Dispatch edges are the successors the non-exception view filters out.
    let has_dispatch_edge = graph.blocks().any(|(id, _)| {
        graph.successors(id).count() > graph.non_exception_successors(id).count()
    });
    assert!(has_dispatch_edge, "dispatch edge lost");
}
