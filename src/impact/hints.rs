//! Hint computation and risk scoring

use crate::store::CallGraph;
use crate::Store;

use super::bfs::reverse_bfs;
use super::types::{FunctionHints, RiskLevel, RiskScore};
use super::DEFAULT_MAX_TEST_SEARCH_DEPTH;

/// Core implementation — accepts pre-loaded graph and test chunks.
///
/// Use this when processing multiple functions to avoid loading the graph
/// N times (e.g., scout, which processes 10+ functions).
///
/// `max_test_depth` controls BFS depth for test discovery (default: [`DEFAULT_MAX_TEST_SEARCH_DEPTH`]).
pub fn compute_hints_with_graph(
    graph: &CallGraph,
    test_chunks: &[crate::store::ChunkSummary],
    function_name: &str,
    prefetched_caller_count: Option<usize>,
) -> FunctionHints {
    compute_hints_with_graph_depth(
        graph,
        test_chunks,
        function_name,
        prefetched_caller_count,
        DEFAULT_MAX_TEST_SEARCH_DEPTH,
    )
}

/// Like [`compute_hints_with_graph`] but with configurable BFS depth.
pub fn compute_hints_with_graph_depth(
    graph: &CallGraph,
    test_chunks: &[crate::store::ChunkSummary],
    function_name: &str,
    prefetched_caller_count: Option<usize>,
    max_test_depth: usize,
) -> FunctionHints {
    // Note: prefetched_caller_count (from get_caller_counts_batch / get_callers_full)
    // counts DB rows which may include duplicate caller names from different files.
    // graph.reverse counts unique caller names per the in-memory graph. These can
    // diverge slightly. We prefer the prefetched count when available since it matches
    // what the caller already displayed, avoiding confusing mismatches.
    let caller_count = match prefetched_caller_count {
        Some(n) => n,
        None => graph
            .reverse
            .get(function_name)
            .map(|v| v.len())
            .unwrap_or(0),
    };
    let ancestors = reverse_bfs(graph, function_name, max_test_depth);
    let test_count = test_chunks
        .iter()
        .filter(|t| ancestors.get(&t.name).is_some_and(|&d| d > 0))
        .count();

    FunctionHints {
        caller_count,
        test_count,
    }
}

/// Compute caller count and test count for a single function.
///
/// Convenience wrapper that loads graph internally. Pass `prefetched_caller_count`
/// to avoid re-querying callers when the caller already has them (e.g., `explain`
/// fetches callers before this).
pub fn compute_hints(
    store: &Store,
    function_name: &str,
    prefetched_caller_count: Option<usize>,
) -> anyhow::Result<FunctionHints> {
    let caller_count = match prefetched_caller_count {
        Some(n) => n,
        None => store.get_callers_full(function_name)?.len(),
    };
    let graph = store.get_call_graph()?;
    let test_chunks = store.find_test_chunks()?;
    Ok(compute_hints_with_graph(
        &graph,
        &test_chunks,
        function_name,
        Some(caller_count),
    ))
}

/// Compute risk scores for a batch of function names.
///
/// Uses pre-loaded call graph and test chunks to avoid repeated queries.
/// Formula: `score = caller_count * (1.0 - coverage)` where
/// `coverage = min(test_count / max(caller_count, 1), 1.0)`.
///
/// Entry-point handling: functions with 0 callers and 0 tests get `Medium`
/// risk (likely entry points that should have tests).
pub fn compute_risk_batch(
    names: &[&str],
    graph: &CallGraph,
    test_chunks: &[crate::store::ChunkSummary],
) -> Vec<RiskScore> {
    let _span = tracing::info_span!("compute_risk_batch", count = names.len()).entered();

    names
        .iter()
        .map(|name| {
            let hints = compute_hints_with_graph(graph, test_chunks, name, None);
            let caller_count = hints.caller_count;
            let test_count = hints.test_count;
            let coverage = if caller_count == 0 {
                if test_count > 0 {
                    1.0
                } else {
                    0.0
                }
            } else {
                (test_count as f32 / caller_count as f32).min(1.0)
            };
            let score = caller_count as f32 * (1.0 - coverage);
            let risk_level = if caller_count == 0 && test_count == 0 {
                // Entry point with no tests — flag as medium
                RiskLevel::Medium
            } else if score >= 5.0 {
                RiskLevel::High
            } else if score >= 2.0 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            };
            RiskScore {
                name: name.to_string(),
                caller_count,
                test_count,
                coverage,
                risk_level,
                score,
            }
        })
        .collect()
}

/// Find the most-called functions in the codebase (hotspots).
///
/// Returns `(function_name, caller_count)` sorted by caller count descending.
pub fn find_hotspots(graph: &CallGraph, top_n: usize) -> Vec<(String, usize)> {
    let _span = tracing::info_span!("find_hotspots", top_n).entered();

    let mut hotspots: Vec<(String, usize)> = graph
        .reverse
        .iter()
        .map(|(name, callers)| (name.clone(), callers.len()))
        .collect();
    hotspots.sort_by(|a, b| b.1.cmp(&a.1));
    hotspots.truncate(top_n);
    hotspots
}


