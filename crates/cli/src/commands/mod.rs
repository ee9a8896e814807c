pub mod analyze;
pub mod paths;
pub mod stack;

pub use analyze::*;
pub use paths::*;
pub use stack::*;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use elfscope_core::analysis::calls;
use elfscope_core::disasm::Disassembler;
use elfscope_core::graph::CallGraph;
use elfscope_core::loader::Binary;

/// Runs the front half of the pipeline: load, decode, build the graph.
pub(crate) fn load_and_analyze(elf: &Path) -> Result<(Binary, Disassembler, CallGraph)> {
    let binary = Binary::load(elf)?;
    let disasm = Disassembler::new(&binary)?;
    let graph = calls::analyze(&binary, &disasm);
    Ok((binary, disasm, graph))
}

/// Pretty-prints a report to stdout, or writes it to `output` when given.
pub(crate) fn emit<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
