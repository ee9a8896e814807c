use std::path::Path;

use anyhow::Result;

use elfscope_core::analysis::paths::{self, PathQuery};
use elfscope_core::report;

use crate::commands::{emit, load_and_analyze};

/// Enumerate call paths reaching a target function.
#[allow(clippy::too_many_arguments)]
pub fn paths_command(
    elf: &Path,
    target: &str,
    source: Option<&str>,
    max_depth: usize,
    include_cycles: bool,
    include_unresolved: bool,
    output: Option<&Path>,
) -> Result<()> {
    let (binary, _disasm, graph) = load_and_analyze(elf)?;
    let query = PathQuery {
        target: target.to_string(),
        source: source.map(str::to_string),
        max_depth,
        include_cycles,
        include_unresolved,
    };
    let set = paths::find_paths(&graph, &query)?;
    let doc = report::path_report(&binary, &graph, &query, &set);
    eprintln!(
        "{} path(s) to `{}`",
        doc.path_analysis.statistics.total_paths, target
    );
    emit(&doc, output)
}

/// Export caller/callee details for one function.
pub fn function_command(elf: &Path, name: &str, output: Option<&Path>) -> Result<()> {
    let (binary, _disasm, graph) = load_and_analyze(elf)?;
    let doc = report::function_detail_report(&binary, &graph, name)?;
    emit(&doc, output)
}
