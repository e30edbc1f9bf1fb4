//! # icgraph-analysis
//!
//! Whole-program call-graph construction with indirect and virtual call
//! resolution.
//!
//! This crate provides:
//! - The result store shared by every pass ([`GlobalContext`])
//! - A fixpoint driver over modules
//! - The base call-graph builder
//! - Signature matching, multi-layer type analysis, its data-flow
//!   enhanced variant and pointer-flow resolution
//! - Class-hierarchy analysis for C++ virtual calls
//! - Tarjan SCCs and a function-level call-graph view
//! - A text dump of resolved indirect calls
//!
//! ```no_run
//! use icgraph_analysis::{analyze, AnalysisConfig, AnalysisKind};
//! # fn demo(program: &icgraph_core::Program) {
//! let config = AnalysisConfig::new().with_kind(AnalysisKind::MultiLayer);
//! let ctx = analyze(program, &config);
//! println!("{} indirect calls", ctx.indirect_calls().len());
//! # }
//! ```

pub mod callgraph;
pub mod cha;
pub mod config;
pub mod context;
pub mod dataflow;
pub mod driver;
pub mod dump;
pub mod error;
pub mod layers;
pub mod pointer_flow;
pub mod scc;
pub mod signature;
pub mod strategy;
pub mod type_hash;

use icgraph_core::Program;

pub use callgraph::{CallGraph, CallGraphPass};
pub use cha::{ClassAttrs, ClassHierarchy, ClassHierarchyAnalysis};
pub use config::{AnalysisConfig, AnalysisKind, DEFAULT_MAX_TYPE_LAYER};
pub use context::{CallSet, FuncSet, GlobalContext, RunStats};
pub use driver::{run_to_fixpoint, IterativePass, PassSummary};
pub use dump::write_indirect_calls;
pub use error::{Error, Result};
pub use layers::MultiLayerAnalysis;
pub use pointer_flow::PointerFlowAnalysis;
pub use scc::{tarjan_scc, SccStats};
pub use signature::SignatureMatcher;
pub use strategy::{build_resolver, CallResolver};
pub use type_hash::{SignatureHash, TypeHash, TypeLayer};

/// Runs the strategy selected by `config` over `program` and returns the
/// populated result store.
pub fn analyze(program: &Program, config: &AnalysisConfig) -> GlobalContext {
    let mut ctx = GlobalContext::new(program);
    let mut pass = CallGraphPass::new(build_resolver(config)).with_debug(config.debug_mode);
    run_to_fixpoint(&mut pass, program, &mut ctx);
    ctx
}
