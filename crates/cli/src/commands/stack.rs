use std::path::Path;

use anyhow::Result;

use elfscope_core::analysis::stack;
use elfscope_core::report;
use elfscope_core::AnalysisConfig;

use crate::commands::{emit, load_and_analyze};

/// Report worst-case stack consumption for one function.
pub fn stack_command(
    elf: &Path,
    name: &str,
    recursion_depth: u32,
    ext_stack_budget: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let (binary, disasm, graph) = load_and_analyze(elf)?;
    let config = AnalysisConfig {
        recursion_depth,
        ext_stack_budget,
        ..AnalysisConfig::default()
    };
    let analysis = stack::analyze(&binary, &disasm, &graph, &config);
    let doc = report::StackReportDoc {
        metadata: report::StackMetadata::new(&binary, &config, &analysis),
        stack_analysis: analysis.report(&graph, name)?,
    };
    emit(&doc, output)
}

/// Rank functions by worst-case stack consumption.
pub fn stack_summary_command(
    elf: &Path,
    top: usize,
    recursion_depth: u32,
    ext_stack_budget: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let (binary, disasm, graph) = load_and_analyze(elf)?;
    let config = AnalysisConfig {
        recursion_depth,
        ext_stack_budget,
        ..AnalysisConfig::default()
    };
    let analysis = stack::analyze(&binary, &disasm, &graph, &config);
    let (summary, heavy_functions) = analysis.summary(&graph, top);
    let doc = report::StackSummaryDoc {
        metadata: report::StackMetadata::new(&binary, &config, &analysis),
        summary,
        heavy_functions,
    };
    emit(&doc, output)
}
