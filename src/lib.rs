// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # classir
//!
//! [![Crates.io](https://img.shields.io/crates/v/classir.svg)](https://crates.io/crates/classir)
//! [![Documentation](https://docs.rs/classir/badge.svg)](https://docs.rs/classir)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/classir/blob/main/LICENSE)
//!
//! A compiler middle-end for JVM-style stack-machine bytecode. `classir`
//! lifts an instruction stream into a graph-based register IR, converts the
//! graph to pruned SSA form, folds values into their uses where the paths
//! allow it, and destructs SSA back to a conventional form — without ever
//! materializing per-block live sets during destruction.
//!
//! ## Features
//!
//! - **Abstract-interpretation lifting** - A symbolic operand stack turns
//!   stack shuffling (`dup_x2`, `swap`, ...) into plain variable copies
//! - **Exception-aware control flow** - Protected ranges become typed
//!   dispatch edges, preserved through every later pass
//! - **Pruned SSA** - Phis only where a value is actually live, placed on
//!   iterated dominance frontiers
//! - **Reduced-reachability liveness** - Destruction answers interference
//!   queries from precomputed reachability sets instead of live sets
//! - **Parallel batch driver** - Independent routines fan out across a
//!   `rayon` pool
//!
//! ## Quick Start
//!
//! ```rust
//! use classir::ir::{ConstValue, ValueType};
//! use classir::lift::Insn;
//! use classir::{Pipeline, Routine};
//!
//! let routine = Routine::builder("answer")
//!     .ret(ValueType::Int)
//!     .insn(Insn::Const(ConstValue::Int(42)))
//!     .insn(Insn::Return { ty: ValueType::Int })
//!     .build();
//!
//! let graph = Pipeline::default().run(&routine)?;
//! assert!(graph.entry().is_some());
//! # Ok::<(), classir::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`lift`] - Instruction model, the lifter, and the graph naturalizer
//! - [`ir`] - Statements, expression trees, locals, and the symbolic stack
//! - [`flow`] - The control-flow graph, typed edges, and exception ranges
//! - [`ssa`] - SSA construction, value propagation, and destruction
//! - [`pipeline`] - The per-routine pipeline and the parallel batch driver
//! - [`utils`] - The graph container, traversals, dominators, and bit sets
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result). Malformed
//! input (incoherent stack heights, dangling labels) is reported as
//! [`Error::Malformed`]; instructions the lifter refuses to model
//! (`jsr`/`ret`) abort the routine with
//! [`Error::UnsupportedInstruction`]; inconsistencies detected by the SSA
//! passes are [`Error::Internal`].

#[macro_use]
pub(crate) mod error;

pub mod flow;
pub mod ir;
pub mod lift;
pub mod pipeline;
pub mod ssa;
pub mod utils;

pub use error::Error;
pub use lift::Routine;
pub use pipeline::{Pipeline, PipelineConfig};

/// `classir` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] used by every fallible
/// operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;
