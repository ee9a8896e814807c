use std::path::Path;

use anyhow::Result;

use elfscope_core::report;

use crate::commands::{emit, load_and_analyze};
use crate::sha256_file;

/// Show basic information about an ELF file.
pub fn info_command(elf: &Path, output: Option<&Path>) -> Result<()> {
    let (binary, _disasm, _graph) = load_and_analyze(elf)?;
    let mut file_info = report::FileInfo::new(&binary);
    file_info.sha256 = sha256_file(elf).ok();
    let doc = report::InfoReport {
        metadata: report::Metadata::new(&binary),
        elf_info: file_info,
    };
    emit(&doc, output)
}

/// Analyze call relationships and export the call-graph report.
pub fn analyze_command(
    elf: &Path,
    output: Option<&Path>,
    no_stats: bool,
    no_details: bool,
) -> Result<()> {
    let (binary, _disasm, graph) = load_and_analyze(elf)?;
    let doc = report::call_report(&binary, &graph, !no_details, !no_stats);
    if let Some(stats) = &doc.statistics {
        eprintln!(
            "{}: {} functions, {} calls, {} external",
            binary.path.display(),
            stats.total_functions,
            stats.total_calls,
            stats.external_functions
        );
    }
    emit(&doc, output)
}

/// Export the analysis summary: statistics, cycles, complexity.
pub fn summary_command(elf: &Path, output: Option<&Path>) -> Result<()> {
    let (binary, _disasm, graph) = load_and_analyze(elf)?;
    let doc = report::summary_report(&binary, &graph);
    emit(&doc, output)
}

/// Export the complete analysis document.
pub fn complete_command(elf: &Path, output: Option<&Path>) -> Result<()> {
    let (binary, _disasm, graph) = load_and_analyze(elf)?;
    let doc = report::complete_report(&binary, &graph);
    emit(&doc, output)
}
