//! JSON report shapes.
//!
//! Serde structs for every document the tool emits: the call-relationship
//! report, the path report, the per-function stack report, the stack
//! summary, plus the file-info, function-detail, analysis-summary, and
//! complete-analysis documents. Shapes are stable; breaking changes bump
//! the version field carried in the metadata.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::analysis::paths::{PathSet, PathStatistics, PathQuery};
use crate::analysis::stack::{HeavyFunction, StackAnalysis, StackReport, StackSummary};
use crate::graph::{CallGraph, EdgeKind, NodeKind};
use crate::loader::Binary;
use crate::{AnalysisConfig, TailCallPolicy};

pub const TOOL_NAME: &str = "ElfScope";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub tool_name: String,
    pub version: String,
    pub export_time: String,
    pub elf_file: String,
    pub architecture: String,
}

impl Metadata {
    pub fn new(binary: &Binary) -> Self {
        Self {
            tool_name: TOOL_NAME.to_string(),
            version: crate::version().to_string(),
            export_time: Utc::now().to_rfc3339(),
            elf_file: binary.path.display().to_string(),
            architecture: binary.arch.name().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Call-relationship report

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub address: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demangled: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRelationship {
    pub from_function: String,
    pub to_function: String,
    pub from_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    pub instruction: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_functions: usize,
    pub total_calls: usize,
    pub external_functions: usize,
    pub recursive_functions: usize,
    pub average_calls_per_function: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReport {
    pub metadata: Metadata,
    pub functions: BTreeMap<String, FunctionEntry>,
    pub call_relationships: Vec<CallRelationship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<GraphStatistics>,
}

pub fn graph_statistics(graph: &CallGraph) -> GraphStatistics {
    let total_functions = graph.len();
    let total_calls = graph.edge_count();
    GraphStatistics {
        total_functions,
        total_calls,
        external_functions: graph
            .nodes()
            .filter(|(_, n)| n.kind.is_external())
            .count(),
        recursive_functions: graph
            .nodes()
            .filter(|(id, _)| graph.is_recursive(*id))
            .count(),
        average_calls_per_function: if total_functions > 0 {
            total_calls as f64 / total_functions as f64
        } else {
            0.0
        },
    }
}

pub fn function_entries(graph: &CallGraph) -> BTreeMap<String, FunctionEntry> {
    graph
        .nodes()
        .map(|(_, node)| {
            (
                node.name.clone(),
                FunctionEntry {
                    name: node.name.clone(),
                    address: format!("{:#x}", node.address.unwrap_or(0)),
                    size: node.size,
                    kind: node.kind,
                    external: node.kind.is_external(),
                    demangled: node.demangled.clone(),
                    aliases: node.aliases.clone(),
                },
            )
        })
        .collect()
}

pub fn call_relationships(graph: &CallGraph) -> Vec<CallRelationship> {
    graph
        .edges()
        .iter()
        .map(|e| CallRelationship {
            from_function: graph.node(e.from).name.clone(),
            to_function: graph.node(e.to).name.clone(),
            from_address: format!("{:#x}", e.site),
            to_address: e.target_addr.map(|a| format!("{a:#x}")),
            instruction: e.text.clone(),
            kind: e.kind,
        })
        .collect()
}

pub fn call_report(
    binary: &Binary,
    graph: &CallGraph,
    include_details: bool,
    include_statistics: bool,
) -> CallReport {
    CallReport {
        metadata: Metadata::new(binary),
        functions: if include_details {
            function_entries(graph)
        } else {
            BTreeMap::new()
        },
        call_relationships: call_relationships(graph),
        statistics: include_statistics.then(|| graph_statistics(graph)),
    }
}

// ---------------------------------------------------------------------------
// Path report

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathQueryInfo {
    pub target_function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_function: Option<String>,
    pub max_depth: usize,
    pub include_cycles: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMetadata {
    #[serde(flatten)]
    pub base: Metadata,
    pub query: PathQueryInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub step: usize,
    pub from: String,
    pub to: String,
    pub calls: Vec<CallRelationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub path: Vec<String>,
    pub length: usize,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathAnalysis {
    pub target_function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_function: Option<String>,
    pub paths: Vec<PathEntry>,
    pub statistics: PathStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathReport {
    pub metadata: PathMetadata,
    pub path_analysis: PathAnalysis,
}

pub fn path_report(
    binary: &Binary,
    graph: &CallGraph,
    query: &PathQuery,
    set: &PathSet,
) -> PathReport {
    let paths = set
        .paths
        .iter()
        .map(|path| PathEntry {
            path: path.clone(),
            length: path.len() - 1,
            steps: path
                .windows(2)
                .enumerate()
                .map(|(i, pair)| PathStep {
                    step: i + 1,
                    from: pair[0].clone(),
                    to: pair[1].clone(),
                    calls: calls_between(graph, &pair[0], &pair[1]),
                })
                .collect(),
        })
        .collect();

    PathReport {
        metadata: PathMetadata {
            base: Metadata::new(binary),
            query: PathQueryInfo {
                target_function: query.target.clone(),
                source_function: query.source.clone(),
                max_depth: query.max_depth,
                include_cycles: query.include_cycles,
            },
        },
        path_analysis: PathAnalysis {
            target_function: set.target.clone(),
            source_function: set.source.clone(),
            paths,
            statistics: set.statistics(),
        },
    }
}

/// Every concrete call site connecting two named functions.
pub fn calls_between(graph: &CallGraph, from: &str, to: &str) -> Vec<CallRelationship> {
    let (Some(from_id), Some(to_id)) = (graph.node_named(from), graph.node_named(to)) else {
        return Vec::new();
    };
    graph
        .out_edges(from_id)
        .filter(|(_, e)| e.to == to_id)
        .map(|(_, e)| CallRelationship {
            from_function: from.to_string(),
            to_function: to.to_string(),
            from_address: format!("{:#x}", e.site),
            to_address: e.target_addr.map(|a| format!("{a:#x}")),
            instruction: e.text.clone(),
            kind: e.kind,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stack reports

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackMetadata {
    #[serde(flatten)]
    pub base: Metadata,
    pub recursion_depth: u32,
    pub ext_stack_budget: u64,
    pub tail_call_policy: TailCallPolicy,
}

impl StackMetadata {
    pub fn new(binary: &Binary, config: &AnalysisConfig, analysis: &StackAnalysis) -> Self {
        Self {
            base: Metadata::new(binary),
            recursion_depth: config.recursion_depth,
            ext_stack_budget: analysis.ext_stack_budget,
            tail_call_policy: config.tail_call_policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackReportDoc {
    pub metadata: StackMetadata,
    pub stack_analysis: StackReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSummaryDoc {
    pub metadata: StackMetadata,
    pub summary: StackSummary,
    pub heavy_functions: Vec<HeavyFunction>,
}

// ---------------------------------------------------------------------------
// File info, function detail, analysis summary, complete analysis

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filepath: String,
    pub architecture: String,
    pub class: u8,
    pub endianness: String,
    pub file_type: String,
    pub entry_point: String,
    pub num_sections: usize,
    pub num_functions: usize,
    pub num_imports: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl FileInfo {
    pub fn new(binary: &Binary) -> Self {
        Self {
            filepath: binary.path.display().to_string(),
            architecture: binary.arch.name().to_string(),
            class: binary.bitness,
            endianness: format!("{:?}", binary.endianness).to_lowercase(),
            file_type: if binary.is_shared_object {
                "shared_object".to_string()
            } else {
                "executable".to_string()
            },
            entry_point: format!("{:#x}", binary.entry_point),
            num_sections: binary.sections.len(),
            num_functions: binary.functions.len(),
            num_imports: binary.imports.len(),
            sha256: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoReport {
    pub metadata: Metadata,
    pub elf_info: FileInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedList {
    pub count: usize,
    pub functions: Vec<String>,
}

impl NamedList {
    fn new(mut functions: Vec<String>) -> Self {
        functions.sort();
        Self {
            count: functions.len(),
            functions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionProperties {
    pub is_recursive: bool,
    pub is_leaf_function: bool,
    pub is_entry_function: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reachability {
    pub can_reach: NamedList,
    pub reachable_from: NamedList,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDetails {
    pub name: String,
    pub callers: NamedList,
    pub callees: NamedList,
    pub properties: FunctionProperties,
    pub reachability: Reachability,
    pub call_details: BTreeMap<String, Vec<CallRelationship>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDetailReport {
    pub metadata: Metadata,
    pub function_details: FunctionDetails,
}

pub fn function_detail_report(
    binary: &Binary,
    graph: &CallGraph,
    name: &str,
) -> Result<FunctionDetailReport, crate::analysis::QueryError> {
    let id = graph
        .node_named(name)
        .ok_or_else(|| crate::analysis::QueryError::UnknownFunction(name.to_string()))?;

    let callers: Vec<String> = graph
        .caller_names(id)
        .into_iter()
        .map(str::to_string)
        .collect();
    let callees: Vec<String> = graph
        .callee_names(id)
        .into_iter()
        .map(str::to_string)
        .collect();

    let call_details = callees
        .iter()
        .map(|callee| (callee.clone(), calls_between(graph, name, callee)))
        .collect();

    let names_of = |ids: std::collections::BTreeSet<crate::graph::NodeId>| {
        NamedList::new(ids.into_iter().map(|v| graph.node(v).name.clone()).collect())
    };

    Ok(FunctionDetailReport {
        metadata: Metadata::new(binary),
        function_details: FunctionDetails {
            name: name.to_string(),
            properties: FunctionProperties {
                is_recursive: graph.is_recursive(id),
                is_leaf_function: callees.is_empty(),
                is_entry_function: callers.is_empty(),
            },
            reachability: Reachability {
                can_reach: names_of(graph.descendants(id)),
                reachable_from: names_of(graph.ancestors(id)),
            },
            callers: NamedList::new(callers),
            callees: NamedList::new(callees),
            call_details,
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_functions: usize,
    pub total_calls: usize,
    pub external_functions: usize,
    pub recursive_functions: usize,
    pub call_cycles: usize,
    pub average_calls_per_function: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotableFindings {
    pub cycles: Vec<Vec<String>>,
    pub has_recursion: bool,
    pub complexity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub metadata: Metadata,
    pub file_summary: FileInfo,
    pub analysis_summary: AnalysisSummary,
    pub notable_findings: NotableFindings,
}

pub fn summary_report(binary: &Binary, graph: &CallGraph) -> SummaryReport {
    let stats = graph_statistics(graph);
    let cycles = graph.cycles();
    let complexity = assess_complexity(&stats, cycles.len());
    SummaryReport {
        metadata: Metadata::new(binary),
        file_summary: FileInfo::new(binary),
        analysis_summary: AnalysisSummary {
            total_functions: stats.total_functions,
            total_calls: stats.total_calls,
            external_functions: stats.external_functions,
            recursive_functions: stats.recursive_functions,
            call_cycles: cycles.len(),
            average_calls_per_function: stats.average_calls_per_function,
        },
        notable_findings: NotableFindings {
            has_recursion: stats.recursive_functions > 0,
            cycles,
            complexity,
        },
    }
}

fn assess_complexity(stats: &GraphStatistics, cycles: usize) -> String {
    let avg = stats.average_calls_per_function;
    if stats.total_functions < 10 {
        "simple"
    } else if stats.total_functions < 50 && avg < 3.0 {
        "moderate"
    } else if stats.total_functions < 200 && avg < 5.0 && cycles < 5 {
        "complex"
    } else {
        "highly_complex"
    }
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteReport {
    pub metadata: Metadata,
    pub elf_info: FileInfo,
    pub functions: BTreeMap<String, FunctionEntry>,
    pub call_relationships: Vec<CallRelationship>,
    pub statistics: GraphStatistics,
}

pub fn complete_report(binary: &Binary, graph: &CallGraph) -> CompleteReport {
    CompleteReport {
        metadata: Metadata::new(binary),
        elf_info: FileInfo::new(binary),
        functions: function_entries(graph),
        call_relationships: call_relationships(graph),
        statistics: graph_statistics(graph),
    }
}
