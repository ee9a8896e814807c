mod common;

use std::path::Path;

use elfscope_core::analysis::{calls, stack};
use elfscope_core::disasm::Disassembler;
use elfscope_core::graph::{CallGraph, UNRESOLVED};
use elfscope_core::loader::Binary;
use elfscope_core::model::Confidence;
use elfscope_core::AnalysisConfig;

use common::{
    call_rel, function_body, jmp_rel, ElfBuilder, BODY_OFFSET, CALL_RAX, SUB_RSP_RAX,
};

fn analyze_bytes(data: &[u8], config: &AnalysisConfig) -> (CallGraph, stack::StackAnalysis) {
    let binary = Binary::parse(Path::new("fixture.elf"), data).expect("fixture loads");
    let disasm = Disassembler::new(&binary).expect("capstone init");
    let graph = calls::analyze(&binary, &disasm);
    let analysis = stack::analyze(&binary, &disasm, &graph, config);
    (graph, analysis)
}

fn report(
    graph: &CallGraph,
    analysis: &stack::StackAnalysis,
    name: &str,
) -> stack::StackReport {
    analysis.report(graph, name).expect("function exists")
}

/// S1: main -> helper -> leaf with 16-byte frames adds up to 48 bytes.
#[test]
fn simple_chain_accumulates_frames() {
    let (graph, analysis) = analyze_bytes(&common::chain(), &AnalysisConfig::default());

    let leaf = report(&graph, &analysis, "leaf");
    assert_eq!(leaf.local_stack_frame, 16);
    assert_eq!(leaf.max_total_stack, 16);
    assert_eq!(leaf.confidence, Confidence::Exact);
    assert!(!leaf.dynamic_alloca);

    let main = report(&graph, &analysis, "main");
    assert_eq!(main.local_stack_frame, 16);
    assert_eq!(main.max_total_stack, 48);
    assert_eq!(main.stack_consumed_by_calls, 32);
    assert_eq!(main.max_stack_call_path, ["main", "helper", "leaf"]);
    assert!(!main.is_recursive);
}

/// S2: direct self-recursion unrolls to depth x local.
#[test]
fn self_recursion_uses_the_unroll_heuristic() {
    let mut b = ElfBuilder::x86_64();
    let fact = b.slot_addr(0);
    b.add_function(
        "fact",
        &function_body(0x18, &call_rel(fact + BODY_OFFSET, fact)),
    );
    let (graph, analysis) = analyze_bytes(&b.build(), &AnalysisConfig::default());

    let r = report(&graph, &analysis, "fact");
    assert_eq!(r.local_stack_frame, 32);
    assert_eq!(r.max_total_stack, 320);
    assert!(r.is_recursive);
    assert_eq!(r.max_stack_call_path, ["fact", "fact (recursion × 10)"]);
}

#[test]
fn recursion_depth_is_configurable() {
    let mut b = ElfBuilder::x86_64();
    let fact = b.slot_addr(0);
    b.add_function(
        "fact",
        &function_body(0x18, &call_rel(fact + BODY_OFFSET, fact)),
    );
    let config = AnalysisConfig {
        recursion_depth: 5,
        ..AnalysisConfig::default()
    };
    let (graph, analysis) = analyze_bytes(&b.build(), &config);
    assert_eq!(report(&graph, &analysis, "fact").max_total_stack, 160);
}

/// S3: mutual recursion is costed from the largest frame in the cycle.
#[test]
fn mutual_recursion_unrolls_the_scc() {
    let mut b = ElfBuilder::x86_64();
    let a = b.slot_addr(0);
    let bb = b.slot_addr(1);
    b.add_function("a", &function_body(8, &call_rel(a + BODY_OFFSET, bb)));
    b.add_function("b", &function_body(0x10, &call_rel(bb + BODY_OFFSET, a)));
    let (graph, analysis) = analyze_bytes(&b.build(), &AnalysisConfig::default());

    let ra = report(&graph, &analysis, "a");
    assert_eq!(ra.local_stack_frame, 16);
    // 10 x max(16, 24) + local(a)
    assert_eq!(ra.max_total_stack, 16 + 10 * 24);
    assert!(ra.is_recursive);
    assert!(ra
        .max_stack_call_path
        .iter()
        .any(|step| step.contains("(recursion × 10)")));

    let rb = report(&graph, &analysis, "b");
    assert_eq!(rb.max_total_stack, 24 + 10 * 24);
}

/// S4: an indirect call site is charged the external budget.
#[test]
fn indirect_call_contributes_the_external_budget() {
    let mut b = ElfBuilder::x86_64();
    b.add_function("dispatch", &function_body(8, &CALL_RAX));
    let (graph, analysis) = analyze_bytes(&b.build(), &AnalysisConfig::default());

    let r = report(&graph, &analysis, "dispatch");
    // 16 local + 8 bytes/word x 4 for the unresolved target.
    assert_eq!(r.max_total_stack, 16 + 32);
    assert_eq!(r.max_stack_call_path, ["dispatch", UNRESOLVED]);
    assert_eq!(
        r.called_functions,
        vec![stack::CalleeStackInfo {
            function: UNRESOLVED.to_string(),
            stack_frame: 32,
            external: true,
        }]
    );
}

#[test]
fn external_budget_is_configurable() {
    let mut b = ElfBuilder::x86_64();
    b.add_function("dispatch", &function_body(8, &CALL_RAX));
    let config = AnalysisConfig {
        ext_stack_budget: Some(100),
        ..AnalysisConfig::default()
    };
    let (graph, analysis) = analyze_bytes(&b.build(), &config);
    assert_eq!(report(&graph, &analysis, "dispatch").max_total_stack, 116);
}

/// S5: under the reuse-frame policy a tail call does not stack the
/// caller's frame on top of the callee's total.
#[test]
fn tail_call_reuses_the_frame() {
    let mut b = ElfBuilder::x86_64();
    let wrapper = b.slot_addr(0);
    let imp = b.slot_addr(1);
    b.add_function("wrapper", &jmp_rel(wrapper, imp));
    b.add_function("impl_fn", &function_body(8, &[]));
    let (graph, analysis) = analyze_bytes(&b.build(), &AnalysisConfig::default());

    let r = report(&graph, &analysis, "wrapper");
    assert_eq!(r.local_stack_frame, 0);
    assert_eq!(r.max_total_stack, 16, "max(local(wrapper), total(impl))");
    assert_eq!(r.max_stack_call_path, ["wrapper", "impl_fn"]);
}

#[test]
fn dynamic_sp_adjustment_is_flagged_unbounded() {
    let mut b = ElfBuilder::x86_64();
    b.add_function("vla_user", &function_body(8, &SUB_RSP_RAX));
    let (graph, analysis) = analyze_bytes(&b.build(), &AnalysisConfig::default());

    let r = report(&graph, &analysis, "vla_user");
    assert!(r.dynamic_alloca);
    assert_eq!(r.confidence, Confidence::Unknown);
    assert_eq!(r.local_stack_frame, 0);
}

#[test]
fn late_body_allocation_is_caught_by_the_rescan() {
    // Prologue allocates 16; deeper in the body another sub rsp, 0x40.
    let body = [0x48, 0x83, 0xec, 0x40]; // sub rsp, 0x40
    let mut b = ElfBuilder::x86_64();
    b.add_function("two_phase", &function_body(8, &body));
    let (graph, analysis) = analyze_bytes(&b.build(), &AnalysisConfig::default());

    // The prologue window sees push+sub+sub contiguous here, so the
    // cumulative depth (8 + 8 + 64) wins over any single allocation.
    let r = report(&graph, &analysis, "two_phase");
    assert_eq!(r.local_stack_frame, 80);
}

#[test]
fn totals_never_undercut_local_frames() {
    let (graph, analysis) = analyze_bytes(&common::chain(), &AnalysisConfig::default());
    for (id, _node) in graph.nodes() {
        assert!(analysis.total(id) >= analysis.frame(id).local_bytes);
    }
}

#[test]
fn unknown_function_is_a_query_error() {
    let (graph, analysis) = analyze_bytes(&common::chain(), &AnalysisConfig::default());
    assert!(analysis.report(&graph, "missing").is_err());
}

#[test]
fn summary_ranks_heavy_functions() {
    let (graph, analysis) = analyze_bytes(&common::chain(), &AnalysisConfig::default());
    let (summary, heavy) = analysis.summary(&graph, 2);

    assert_eq!(summary.architecture, "x86_64");
    assert_eq!(summary.total_functions_analyzed, 3);
    assert_eq!(summary.max_total_stack_consumption, 48);
    assert_eq!(summary.function_with_max_total_stack.as_deref(), Some("main"));
    assert_eq!(summary.max_total_stack_call_path, ["main", "helper", "leaf"]);
    assert_eq!(summary.stack_distribution.small, 3);

    assert_eq!(heavy.len(), 2);
    assert_eq!(heavy[0].function, "main");
    assert_eq!(heavy[0].max_total_stack, 48);
    assert!(heavy[0].stack_ratio > heavy[1].stack_ratio);
}
