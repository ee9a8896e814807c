use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use elfscope_cli::commands;

/// Static call-graph and stack analyzer for ELF binaries.
///
/// The binary is intentionally thin: it parses args, dispatches to command
/// helpers, and lets `elfscope-core` own the real work for testability and
/// reuse.
#[derive(Parser, Debug)]
#[command(
    name = "elfscope",
    version,
    about = "Static call-graph and stack analyzer for ELF binaries",
    long_about = None
)]
struct Cli {
    /// Enable debug logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show basic information about an ELF file.
    Info {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Analyze function call relationships and export them as JSON.
    Analyze {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave the statistics block out of the report.
        #[arg(long)]
        no_stats: bool,

        /// Leave the per-function detail map out of the report.
        #[arg(long)]
        no_details: bool,
    },

    /// Find call paths reaching a target function.
    Paths {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Function the paths must reach.
        target: String,

        /// Only enumerate paths starting from this function.
        #[arg(short, long)]
        source: Option<String>,

        /// Maximum path length in edges.
        #[arg(short = 'd', long, default_value_t = 10)]
        max_depth: usize,

        /// Allow one revisit per node ("one loop around").
        #[arg(long)]
        include_cycles: bool,

        /// Also report paths that go through `@unresolved`.
        #[arg(long)]
        include_unresolved: bool,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show callers, callees, and reachability for one function.
    Function {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Function to describe.
        name: String,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export an analysis summary: statistics, cycles, complexity.
    Summary {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report worst-case stack consumption for one function.
    Stack {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Function to analyze.
        name: String,

        /// Assumed unroll depth for recursive call cycles.
        #[arg(long, default_value_t = 10)]
        recursion_depth: u32,

        /// Stack budget in bytes for external and unresolved call targets.
        #[arg(long)]
        ext_stack_budget: Option<u64>,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rank functions by worst-case stack consumption.
    StackSummary {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Number of heavy functions to report.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Assumed unroll depth for recursive call cycles.
        #[arg(long, default_value_t = 10)]
        recursion_depth: u32,

        /// Stack budget in bytes for external and unresolved call targets.
        #[arg(long)]
        ext_stack_budget: Option<u64>,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the complete analysis document.
    Complete {
        /// Path to the ELF executable or shared object.
        elf: PathBuf,

        /// Write the JSON report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err:#}");
        process::exit(elfscope_cli::exit_code_for(&err));
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Info { elf, output } => commands::info_command(&elf, output.as_deref()),
        Command::Analyze {
            elf,
            output,
            no_stats,
            no_details,
        } => commands::analyze_command(&elf, output.as_deref(), no_stats, no_details),
        Command::Paths {
            elf,
            target,
            source,
            max_depth,
            include_cycles,
            include_unresolved,
            output,
        } => commands::paths_command(
            &elf,
            &target,
            source.as_deref(),
            max_depth,
            include_cycles,
            include_unresolved,
            output.as_deref(),
        ),
        Command::Function { elf, name, output } => {
            commands::function_command(&elf, &name, output.as_deref())
        }
        Command::Summary { elf, output } => commands::summary_command(&elf, output.as_deref()),
        Command::Stack {
            elf,
            name,
            recursion_depth,
            ext_stack_budget,
            output,
        } => commands::stack_command(
            &elf,
            &name,
            recursion_depth,
            ext_stack_budget,
            output.as_deref(),
        ),
        Command::StackSummary {
            elf,
            top,
            recursion_depth,
            ext_stack_budget,
            output,
        } => commands::stack_summary_command(
            &elf,
            top,
            recursion_depth,
            ext_stack_budget,
            output.as_deref(),
        ),
        Command::Complete { elf, output } => commands::complete_command(&elf, output.as_deref()),
    }
}
