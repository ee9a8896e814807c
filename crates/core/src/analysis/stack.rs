//! Stack-frame recovery and worst-case cumulative stack analysis.
//!
//! Local frames come from a prologue-window scan of each function's decoded
//! stream; cumulative totals come from a memoized walk of the SCC-condensed
//! call graph with a bounded-unrolling heuristic for recursion. Heuristic
//! uncertainty is encoded in the results (`confidence`, `dynamic_alloca`),
//! never raised as an error.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::analysis::QueryError;
use crate::arch::ArchSpec;
use crate::disasm::Disassembler;
use crate::graph::{CallGraph, EdgeKind, NodeId, NodeKind};
use crate::loader::Binary;
use crate::model::{Confidence, InsnKind, InsnStream, SpDelta, StackFrame};
use crate::{AnalysisConfig, TailCallPolicy};

/// Per-function stack view, the payload of the `stack` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReport {
    pub function: String,
    pub local_stack_frame: u64,
    pub stack_consumed_by_calls: u64,
    pub max_total_stack: u64,
    pub max_stack_call_path: Vec<String>,
    pub is_recursive: bool,
    pub dynamic_alloca: bool,
    pub confidence: Confidence,
    pub called_functions: Vec<CalleeStackInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalleeStackInfo {
    pub function: String,
    pub stack_frame: u64,
    pub external: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StackDistribution {
    /// < 64 bytes
    pub small: usize,
    /// 64..256 bytes
    pub medium: usize,
    /// 256..1024 bytes
    pub large: usize,
    /// >= 1024 bytes
    pub huge: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummary {
    pub architecture: String,
    pub total_functions_analyzed: usize,
    pub max_total_stack_consumption: u64,
    pub function_with_max_total_stack: Option<String>,
    pub max_total_stack_call_path: Vec<String>,
    pub stack_distribution: StackDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeavyFunction {
    pub function: String,
    pub local_stack_frame: u64,
    pub max_total_stack: u64,
    pub max_stack_call_path: Vec<String>,
    pub stack_ratio: f64,
}

/// Immutable result of the stack analysis pass.
#[derive(Debug)]
pub struct StackAnalysis {
    pub config: AnalysisConfig,
    pub architecture: &'static str,
    pub ext_stack_budget: u64,
    frames: Vec<StackFrame>,
    totals: Vec<u64>,
    paths: Vec<Vec<String>>,
}

/// Runs frame recovery and the cumulative traversal over the whole graph.
pub fn analyze(
    binary: &Binary,
    disasm: &Disassembler,
    graph: &CallGraph,
    config: &AnalysisConfig,
) -> StackAnalysis {
    let spec = disasm.spec();
    let budget = config.budget_for(spec.word_size);
    let recursion_depth = config.recursion_depth.max(1) as u64;

    let frames = local_frames(binary, disasm, graph, spec);
    let (totals, paths) = cumulative(graph, &frames, budget, recursion_depth, config);

    info!(
        "stack analysis: {} functions, external budget {budget} bytes, recursion depth {recursion_depth}",
        binary.functions.len()
    );

    StackAnalysis {
        config: config.clone(),
        architecture: binary.arch.name(),
        ext_stack_budget: budget,
        frames,
        totals,
        paths,
    }
}

impl StackAnalysis {
    pub fn frame(&self, id: NodeId) -> &StackFrame {
        &self.frames[id]
    }

    pub fn total(&self, id: NodeId) -> u64 {
        self.totals[id]
    }

    pub fn path(&self, id: NodeId) -> &[String] {
        &self.paths[id]
    }

    /// The `stack <function>` query.
    pub fn report(&self, graph: &CallGraph, name: &str) -> Result<StackReport, QueryError> {
        let id = graph
            .node_named(name)
            .ok_or_else(|| QueryError::UnknownFunction(name.to_string()))?;
        let frame = &self.frames[id];

        let mut called: Vec<CalleeStackInfo> = Vec::new();
        for callee in graph.callee_ids(id) {
            let node = graph.node(callee);
            called.push(CalleeStackInfo {
                function: node.name.clone(),
                stack_frame: if node.kind.is_external() {
                    self.ext_stack_budget
                } else {
                    self.frames[callee].local_bytes
                },
                external: node.kind.is_external(),
            });
        }
        called.sort_by(|a, b| a.function.cmp(&b.function));

        Ok(StackReport {
            function: name.to_string(),
            local_stack_frame: frame.local_bytes,
            stack_consumed_by_calls: self.totals[id].saturating_sub(frame.local_bytes),
            max_total_stack: self.totals[id],
            max_stack_call_path: self.paths[id].clone(),
            is_recursive: graph.is_recursive(id),
            dynamic_alloca: frame.dynamic_alloca,
            confidence: frame.confidence,
            called_functions: called,
        })
    }

    /// The `stack-summary` query.
    pub fn summary(&self, graph: &CallGraph, top: usize) -> (StackSummary, Vec<HeavyFunction>) {
        let mut distribution = StackDistribution {
            small: 0,
            medium: 0,
            large: 0,
            huge: 0,
        };
        let mut heavy: Vec<HeavyFunction> = Vec::new();
        let mut max_total = 0u64;
        let mut max_node: Option<NodeId> = None;

        for (id, node) in graph.nodes() {
            if node.kind != NodeKind::Internal {
                continue;
            }
            let total = self.totals[id];
            match total {
                0..=63 => distribution.small += 1,
                64..=255 => distribution.medium += 1,
                256..=1023 => distribution.large += 1,
                _ => distribution.huge += 1,
            }
            if total > max_total || max_node.is_none() {
                max_total = total;
                max_node = Some(id);
            }
            let local = self.frames[id].local_bytes;
            heavy.push(HeavyFunction {
                function: node.name.clone(),
                local_stack_frame: local,
                max_total_stack: total,
                max_stack_call_path: self.paths[id].clone(),
                stack_ratio: if local > 0 {
                    total as f64 / local as f64
                } else {
                    0.0
                },
            });
        }

        heavy.sort_by(|a, b| {
            b.max_total_stack
                .cmp(&a.max_total_stack)
                .then_with(|| a.function.cmp(&b.function))
        });
        heavy.truncate(top);

        let summary = StackSummary {
            architecture: self.architecture.to_string(),
            total_functions_analyzed: graph
                .nodes()
                .filter(|(_, n)| n.kind == NodeKind::Internal)
                .count(),
            max_total_stack_consumption: max_total,
            function_with_max_total_stack: max_node.map(|id| graph.node(id).name.clone()),
            max_total_stack_call_path: max_node
                .map(|id| self.paths[id].clone())
                .unwrap_or_default(),
            stack_distribution: distribution,
        };

        (summary, heavy)
    }
}

/// Recovers every node's local frame. External nodes get a zero frame;
/// their cost is the external budget, applied edge-side.
fn local_frames(
    binary: &Binary,
    disasm: &Disassembler,
    graph: &CallGraph,
    spec: &ArchSpec,
) -> Vec<StackFrame> {
    graph
        .nodes()
        .map(|(_, node)| match node.kind {
            NodeKind::Internal => {
                let function = binary
                    .function_by_name(&node.name)
                    .expect("internal node has a backing function");
                let stream = disasm.decode(binary, function);
                frame_from_stream(&node.name, &stream, spec, function.size)
            }
            _ => StackFrame {
                function: node.name.clone(),
                local_bytes: 0,
                dynamic_alloca: false,
                confidence: Confidence::Heuristic,
            },
        })
        .collect()
}

/// Prologue-window scan plus a whole-body re-scan for late `sub sp, imm`.
fn frame_from_stream(
    name: &str,
    stream: &InsnStream,
    spec: &ArchSpec,
    size: u64,
) -> StackFrame {
    let mut dynamic = false;
    let mut body_max_alloc: u64 = 0;
    for insn in &stream.insns {
        match insn.kind {
            InsnKind::SpAdjust {
                delta: SpDelta::Dynamic,
            } => dynamic = true,
            InsnKind::SpAdjust {
                delta: SpDelta::Constant(d),
            } if d < 0 => body_max_alloc = body_max_alloc.max((-d) as u64),
            _ => {}
        }
    }

    // Cumulative depth over the prologue window: push-reg, sub-sp-imm, and
    // frame-setup moves keep the window open.
    let mut prologue_depth: u64 = 0;
    for insn in &stream.insns {
        match insn.kind {
            InsnKind::SpAdjust {
                delta: SpDelta::Constant(d),
            } if d < 0 => prologue_depth += (-d) as u64,
            _ if is_frame_setup(spec, insn) => {}
            _ => break,
        }
    }

    let local_bytes = if dynamic {
        // Conservative floor; consumers must honor the flag.
        0
    } else {
        prologue_depth.max(body_max_alloc)
    };

    let confidence = if dynamic {
        Confidence::Unknown
    } else if !stream.gaps.is_empty() || size == 0 || stream.insns.is_empty() {
        Confidence::Heuristic
    } else {
        Confidence::Exact
    };

    if dynamic {
        debug!("`{name}` adjusts SP dynamically; frame reported as unbounded");
    }

    StackFrame {
        function: name.to_string(),
        local_bytes,
        dynamic_alloca: dynamic,
        confidence,
    }
}

/// Frame-pointer setup and padding that doesn't close the prologue window.
fn is_frame_setup(spec: &ArchSpec, insn: &crate::model::Instruction) -> bool {
    if spec
        .prologue_neutral_mnemonics
        .contains(&insn.mnemonic.as_str())
    {
        return true;
    }
    if !spec.frame_move_mnemonics.contains(&insn.mnemonic.as_str()) {
        return false;
    }
    let mentions = |names: &[&str]| {
        names.iter().any(|n| {
            insn.text
                .split([' ', ',', '[', ']'])
                .any(|tok| tok == *n)
        })
    };
    mentions(spec.fp_names) && mentions(spec.sp_names)
}

struct Best {
    contribution: u64,
    /// `None` when no outgoing edge qualified.
    target: Option<NodeId>,
}

/// Memoized post-order traversal of the SCC condensation. `sccs()` emits
/// successor components first, so every cross-component contribution is
/// final by the time a component is costed.
fn cumulative(
    graph: &CallGraph,
    frames: &[StackFrame],
    budget: u64,
    depth: u64,
    config: &AnalysisConfig,
) -> (Vec<u64>, Vec<Vec<String>>) {
    let n = graph.len();
    let mut totals = vec![0u64; n];
    let mut paths: Vec<Vec<String>> = vec![Vec::new(); n];

    for scc in graph.sccs() {
        let is_cycle = scc.len() > 1 || graph.has_self_edge(scc[0]);
        if !is_cycle {
            let v = scc[0];
            let node = graph.node(v);
            if node.kind.is_external() {
                totals[v] = budget;
                paths[v] = vec![node.name.clone()];
                continue;
            }
            let local = frames[v].local_bytes;
            let (calls, tails) = best_successors(graph, &totals, budget, v, None, config);
            let with_calls = local + calls.contribution;
            if let (TailCallPolicy::ReuseFrame, Some(tail_target)) =
                (config.tail_call_policy, tails.target)
            {
                if tails.contribution > with_calls {
                    totals[v] = tails.contribution;
                    paths[v] = prepend(node.name.clone(), &paths[tail_target]);
                    continue;
                }
            }
            totals[v] = with_calls;
            paths[v] = match calls.target {
                Some(t) => prepend(node.name.clone(), &paths[t]),
                None => vec![node.name.clone()],
            };
        } else {
            resolve_cycle(graph, frames, &mut totals, &mut paths, budget, depth, scc, config);
        }
    }

    (totals, paths)
}

/// Costs one recursive component under the bounded-unrolling heuristic:
/// a self-loop costs `depth x local`; entering a larger SCC at F costs
/// `local(F) + depth x max(local over the SCC)`. Either adds the best
/// successor outside the component.
fn resolve_cycle(
    graph: &CallGraph,
    frames: &[StackFrame],
    totals: &mut [u64],
    paths: &mut [Vec<String>],
    budget: u64,
    depth: u64,
    scc: &[NodeId],
    config: &AnalysisConfig,
) {
    let exclude = scc;

    // Best exit edge over the whole component.
    let mut exit = Best {
        contribution: 0,
        target: None,
    };
    for &m in scc {
        let (calls, tails) = best_successors(graph, totals, budget, m, Some(exclude), config);
        for cand in [calls, tails] {
            if cand.target.is_some()
                && (exit.target.is_none() || cand.contribution > exit.contribution)
            {
                exit = cand;
            }
        }
    }
    let exit_contribution = if exit.target.is_some() {
        exit.contribution
    } else {
        0
    };
    let exit_path: Vec<String> = exit
        .target
        .map(|t| paths[t].clone())
        .unwrap_or_default();

    if scc.len() == 1 {
        let v = scc[0];
        let name = &graph.node(v).name;
        totals[v] = depth * frames[v].local_bytes + exit_contribution;
        let mut path = vec![name.clone(), format!("{name} (recursion × {depth})")];
        path.extend(exit_path.iter().cloned());
        paths[v] = path;
        return;
    }

    let scc_max_local = scc
        .iter()
        .map(|&m| frames[m].local_bytes)
        .max()
        .unwrap_or(0);
    let marker = scc
        .iter()
        .filter(|&&m| frames[m].local_bytes == scc_max_local)
        .map(|&m| graph.node(m).name.clone())
        .min()
        .unwrap_or_default();

    for &m in scc {
        totals[m] = frames[m].local_bytes + depth * scc_max_local + exit_contribution;
        let mut path = vec![
            graph.node(m).name.clone(),
            format!("{marker} (recursion × {depth})"),
        ];
        path.extend(exit_path.iter().cloned());
        paths[m] = path;
    }
}

/// Best call-edge and tail-edge contributions out of `v`, skipping targets
/// inside `exclude`. External targets contribute the fixed budget. Under
/// the include-caller-frame policy tail edges are folded into call edges.
fn best_successors(
    graph: &CallGraph,
    totals: &[u64],
    budget: u64,
    v: NodeId,
    exclude: Option<&[NodeId]>,
    config: &AnalysisConfig,
) -> (Best, Best) {
    let mut calls = Best {
        contribution: 0,
        target: None,
    };
    let mut tails = Best {
        contribution: 0,
        target: None,
    };
    for (_, edge) in graph.out_edges(v) {
        if edge.to == v {
            continue;
        }
        if exclude.is_some_and(|scc| scc.contains(&edge.to)) {
            continue;
        }
        let contribution = if graph.node(edge.to).kind.is_external() {
            budget
        } else {
            totals[edge.to]
        };
        let treat_as_tail = edge.kind == EdgeKind::Tail
            && config.tail_call_policy == TailCallPolicy::ReuseFrame;
        let slot = if treat_as_tail { &mut tails } else { &mut calls };
        if slot.target.is_none() || contribution > slot.contribution {
            slot.contribution = contribution;
            slot.target = Some(edge.to);
        }
    }
    (calls, tails)
}

fn prepend(first: String, rest: &[String]) -> Vec<String> {
    let mut path = Vec::with_capacity(rest.len() + 1);
    path.push(first);
    path.extend(rest.iter().cloned());
    path
}
