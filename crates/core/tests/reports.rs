mod common;

use std::path::Path;

use elfscope_core::analysis::paths::{self, PathQuery};
use elfscope_core::analysis::{calls, stack};
use elfscope_core::disasm::Disassembler;
use elfscope_core::graph::CallGraph;
use elfscope_core::loader::Binary;
use elfscope_core::report;
use elfscope_core::AnalysisConfig;

fn pipeline(data: &[u8]) -> (Binary, Disassembler, CallGraph) {
    let binary = Binary::parse(Path::new("fixture.elf"), data).expect("fixture loads");
    let disasm = Disassembler::new(&binary).expect("capstone init");
    let graph = calls::analyze(&binary, &disasm);
    (binary, disasm, graph)
}

#[test]
fn call_report_round_trips_through_json() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let doc = report::call_report(&binary, &graph, true, true);

    let json = serde_json::to_string_pretty(&doc).unwrap();
    let back: report::CallReport = serde_json::from_str(&json).unwrap();
    assert_eq!(doc, back);
}

#[test]
fn call_report_carries_the_documented_shape() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let doc = report::call_report(&binary, &graph, true, true);

    assert_eq!(doc.metadata.tool_name, "ElfScope");
    assert_eq!(doc.metadata.version, elfscope_core::version());
    assert_eq!(doc.metadata.architecture, "x86_64");

    let main = doc.functions.get("main").expect("main entry");
    assert!(main.address.starts_with("0x"));
    assert!(!main.external);

    let stats = doc.statistics.as_ref().expect("statistics included");
    assert_eq!(stats.total_functions, 3);
    assert_eq!(stats.total_calls, 2);
    assert_eq!(stats.external_functions, 0);
    assert_eq!(stats.recursive_functions, 0);
    assert!((stats.average_calls_per_function - 2.0 / 3.0).abs() < 1e-9);

    let rel = &doc.call_relationships[0];
    assert_eq!(rel.from_function, "helper");
    assert_eq!(rel.to_function, "leaf");
    assert!(rel.instruction.starts_with("call"));
}

#[test]
fn analyze_toggles_suppress_sections() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let doc = report::call_report(&binary, &graph, false, false);
    assert!(doc.functions.is_empty());
    assert!(doc.statistics.is_none());
    let json = serde_json::to_string(&doc).unwrap();
    assert!(!json.contains("\"statistics\""));
}

#[test]
fn path_report_describes_each_step() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let query = PathQuery::to_target("leaf");
    let set = paths::find_paths(&graph, &query).unwrap();
    let doc = report::path_report(&binary, &graph, &query, &set);

    assert_eq!(doc.metadata.query.target_function, "leaf");
    assert_eq!(doc.path_analysis.statistics.total_paths, 2);

    let longest = doc
        .path_analysis
        .paths
        .iter()
        .find(|p| p.length == 2)
        .expect("main -> helper -> leaf");
    assert_eq!(longest.path, ["main", "helper", "leaf"]);
    assert_eq!(longest.steps.len(), 2);
    assert_eq!(longest.steps[0].step, 1);
    assert_eq!(longest.steps[0].from, "main");
    assert_eq!(longest.steps[0].to, "helper");
    assert_eq!(longest.steps[0].calls.len(), 1);
    assert!(longest.steps[0].calls[0].from_address.starts_with("0x"));
}

#[test]
fn path_analysis_json_is_byte_identical_across_runs() {
    let data = common::chain();
    let query = PathQuery::to_target("leaf");

    let render = |data: &[u8]| {
        let (binary, _disasm, graph) = pipeline(data);
        let set = paths::find_paths(&graph, &query).unwrap();
        let doc = report::path_report(&binary, &graph, &query, &set);
        serde_json::to_string(&doc.path_analysis).unwrap()
    };

    assert_eq!(render(&data), render(&data));
}

#[test]
fn stack_documents_embed_the_analysis_policy() {
    let (binary, disasm, graph) = pipeline(&common::chain());
    let config = AnalysisConfig::default();
    let analysis = stack::analyze(&binary, &disasm, &graph, &config);

    let doc = report::StackReportDoc {
        metadata: report::StackMetadata::new(&binary, &config, &analysis),
        stack_analysis: analysis.report(&graph, "main").unwrap(),
    };
    let json = serde_json::to_string_pretty(&doc).unwrap();
    assert!(json.contains("\"tail_call_policy\": \"reuse-frame\""));
    assert!(json.contains("\"ext_stack_budget\": 32"));
    assert!(json.contains("\"recursion_depth\": 10"));

    let back: report::StackReportDoc = serde_json::from_str(&json).unwrap();
    assert_eq!(doc, back);

    let (summary, heavy) = analysis.summary(&graph, 10);
    let summary_doc = report::StackSummaryDoc {
        metadata: report::StackMetadata::new(&binary, &config, &analysis),
        summary,
        heavy_functions: heavy,
    };
    let json = serde_json::to_string(&summary_doc).unwrap();
    assert!(json.contains("stack_distribution"));
}

#[test]
fn function_detail_report_covers_reachability() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let doc = report::function_detail_report(&binary, &graph, "helper").unwrap();

    let details = &doc.function_details;
    assert_eq!(details.callers.functions, ["main"]);
    assert_eq!(details.callees.functions, ["leaf"]);
    assert!(!details.properties.is_recursive);
    assert!(!details.properties.is_leaf_function);
    assert!(!details.properties.is_entry_function);
    assert_eq!(details.reachability.can_reach.functions, ["leaf"]);
    assert_eq!(details.reachability.reachable_from.functions, ["main"]);
    assert_eq!(details.call_details["leaf"].len(), 1);

    assert!(report::function_detail_report(&binary, &graph, "missing").is_err());
}

#[test]
fn summary_report_assesses_complexity() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let doc = report::summary_report(&binary, &graph);
    assert_eq!(doc.analysis_summary.total_functions, 3);
    assert_eq!(doc.analysis_summary.call_cycles, 0);
    assert_eq!(doc.notable_findings.complexity, "simple");
    assert!(!doc.notable_findings.has_recursion);
    assert_eq!(doc.file_summary.architecture, "x86_64");
}

#[test]
fn complete_report_bundles_everything() {
    let (binary, _disasm, graph) = pipeline(&common::chain());
    let doc = report::complete_report(&binary, &graph);
    assert_eq!(doc.functions.len(), 3);
    assert_eq!(doc.call_relationships.len(), 2);
    assert_eq!(doc.elf_info.num_functions, 3);
    assert_eq!(doc.statistics.total_calls, 2);
}
