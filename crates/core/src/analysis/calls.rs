//! Call-graph construction.
//!
//! Walks every internal function in ascending address order, decodes it,
//! and turns call-shaped instructions into edges. The ordering makes
//! repeated runs over the same input produce byte-identical reports.

use log::{debug, info};

use crate::disasm::Disassembler;
use crate::graph::{CallEdge, CallGraph, EdgeKind, Node, NodeId, NodeKind, UNRESOLVED};
use crate::loader::Binary;
use crate::model::InsnKind;

/// Builds and freezes the call graph for a loaded binary.
pub fn analyze(binary: &Binary, disasm: &Disassembler) -> CallGraph {
    let mut graph = CallGraph::new();

    for f in &binary.functions {
        graph.add_node(Node {
            name: f.name.clone(),
            kind: NodeKind::Internal,
            address: Some(f.address),
            size: f.size,
            demangled: f.demangled.clone(),
            aliases: f.aliases.clone(),
        });
    }

    for f in &binary.functions {
        let from = graph
            .node_named(&f.name)
            .expect("internal functions are interned above");
        let stream = disasm.decode(binary, f);
        if !stream.gaps.is_empty() {
            debug!(
                "`{}` decoded with {} gap(s)",
                f.name,
                stream.gaps.len()
            );
            graph.record_gaps(&f.name, stream.gaps.clone());
        }

        for insn in &stream.insns {
            match insn.kind {
                InsnKind::CallDirect { target } => {
                    let (to, kind) = resolve_call(&mut graph, binary, target);
                    graph.add_edge(CallEdge {
                        from,
                        to,
                        site: insn.address,
                        target_addr: Some(target),
                        text: insn.text.clone(),
                        kind,
                    });
                }
                InsnKind::CallIndirect => {
                    let to = graph.add_synthetic(UNRESOLVED, NodeKind::Unresolved);
                    graph.add_edge(CallEdge {
                        from,
                        to,
                        site: insn.address,
                        target_addr: None,
                        text: insn.text.clone(),
                        kind: EdgeKind::Indirect,
                    });
                }
                InsnKind::TailJump {
                    target: Some(target),
                } => {
                    // Only jumps that leave the function and land on another
                    // function's entry (or a PLT stub) are tail calls.
                    if let Some(to) = resolve_tail(&mut graph, binary, f.address, target) {
                        graph.add_edge(CallEdge {
                            from,
                            to,
                            site: insn.address,
                            target_addr: Some(target),
                            text: insn.text.clone(),
                            kind: EdgeKind::Tail,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    graph.finalize();
    info!(
        "call graph: {} nodes, {} edges",
        graph.len(),
        graph.edge_count()
    );
    graph
}

/// Resolves a direct call target to a node: a PLT stub is rewritten to the
/// imported symbol it trampolines to, an address inside a known function
/// becomes that function, and anything else becomes `@external:<hex>`.
fn resolve_call(graph: &mut CallGraph, binary: &Binary, target: u64) -> (NodeId, EdgeKind) {
    if let Some(import) = binary.plt_map.get(&target) {
        let to = graph.add_synthetic(import, NodeKind::Imported);
        return (to, EdgeKind::Plt);
    }
    if let Some(tf) = binary.function_at(target) {
        let to = graph.add_internal(&tf.name, tf.address, tf.size);
        return (to, EdgeKind::Direct);
    }
    let to = graph.add_synthetic(&format!("@external:{target:#x}"), NodeKind::External);
    (to, EdgeKind::Direct)
}

fn resolve_tail(
    graph: &mut CallGraph,
    binary: &Binary,
    source_entry: u64,
    target: u64,
) -> Option<NodeId> {
    if let Some(import) = binary.plt_map.get(&target) {
        return Some(graph.add_synthetic(import, NodeKind::Imported));
    }
    match binary.function_at(target) {
        Some(tf) if tf.address == target && tf.address != source_entry => {
            Some(graph.add_internal(&tf.name, tf.address, tf.size))
        }
        // Intra-function branches and jumps into the middle of another
        // function are control flow, not calls.
        _ => None,
    }
}
