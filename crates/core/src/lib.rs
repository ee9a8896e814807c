//! elfscope-core
//!
//! Core library for static analysis of ELF executables and shared objects.
//!
//! This crate recovers the inter-procedural call graph of a binary and
//! derives two higher-level views on top of it: call paths between named
//! functions, and per-function worst-case stack consumption along reachable
//! call chains.
//!
//! The pipeline is strictly sequential: [`loader::Binary`] loads and
//! validates the file, [`disasm::Disassembler`] decodes and classifies
//! instructions, [`analysis::calls`] builds the frozen [`graph::CallGraph`],
//! and [`analysis::paths`] / [`analysis::stack`] answer queries over it.
//! All substantive logic lives here so it is fully testable and reusable
//! from multiple frontends.

use serde::{Deserialize, Serialize};

pub mod analysis;
pub mod arch;
pub mod disasm;
pub mod graph;
pub mod loader;
pub mod model;
pub mod report;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// How a tail call contributes to the caller's cumulative stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TailCallPolicy {
    /// The callee reuses the caller's frame; the caller's local frame is
    /// not stacked on top of the callee's total.
    ReuseFrame,
    /// Conservative alternative: a tail call is costed like a plain call.
    IncludeCallerFrame,
}

/// Tunable knobs for the stack analyzer.
///
/// Passed explicitly through the pipeline; there is no global state. The
/// chosen values are echoed into report metadata so consumers can interpret
/// the numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Assumed unroll depth for recursive call cycles.
    pub recursion_depth: u32,
    /// Stack budget charged for imported, unresolved, and out-of-image call
    /// targets. `None` selects the architecture default (one word times 4).
    pub ext_stack_budget: Option<u64>,
    pub tail_call_policy: TailCallPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recursion_depth: 10,
            ext_stack_budget: None,
            tail_call_policy: TailCallPolicy::ReuseFrame,
        }
    }
}

impl AnalysisConfig {
    /// Effective external stack budget for a given architecture word size.
    pub fn budget_for(&self, word_size: u64) -> u64 {
        self.ext_stack_budget.unwrap_or(word_size * 4)
    }
}
