//! Reference index support for multi-index search
//!
//! A reference index is a standard cqs index (SQLite DB + HNSW files) created
//! from an external codebase. References are read-only during search. Results
//! from references have their scores multiplied by a weight (default 0.8) to
//! rank them below equally-similar project results.

use crate::config::ReferenceConfig;
use crate::hnsw::HnswIndex;
use crate::index::VectorIndex;
use crate::store::{SearchFilter, SearchResult, Store, UnifiedResult};
use crate::Embedding;

/// A loaded reference index ready for searching
pub struct ReferenceIndex {
    /// Display name
    pub name: String,
    /// The reference's store (separate DB + connection pool)
    pub store: Store,
    /// Optional HNSW index for O(log n) search
    pub index: Option<Box<dyn VectorIndex>>,
    /// Score multiplier (0.0-1.0)
    pub weight: f32,
}

/// A search result tagged with its source
#[derive(Debug)]
pub struct TaggedResult {
    /// The underlying search result
    pub result: UnifiedResult,
    /// Source: None = primary project, Some(name) = reference
    pub source: Option<String>,
}

/// Load reference indexes from config, skipping any that fail to open
pub fn load_references(configs: &[ReferenceConfig]) -> Vec<ReferenceIndex> {
    let mut refs = Vec::with_capacity(configs.len());

    for cfg in configs {
        // Warn if reference path is a symlink (trust boundary)
        if cfg
            .path
            .symlink_metadata()
            .map(|m| m.is_symlink())
            .unwrap_or(false)
        {
            tracing::warn!(
                name = cfg.name,
                path = %cfg.path.display(),
                "Reference path is a symlink — verify it points to a trusted location"
            );
        }

        let db_path = cfg.path.join("index.db");
        let store = match Store::open(&db_path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    "Skipping reference '{}': failed to open {}: {}",
                    cfg.name,
                    db_path.display(),
                    e
                );
                continue;
            }
        };

        let index = HnswIndex::try_load(&cfg.path);

        refs.push(ReferenceIndex {
            name: cfg.name.clone(),
            store,
            index,
            weight: cfg.weight,
        });
    }

    if !refs.is_empty() {
        tracing::info!("Loaded {} reference indexes", refs.len());
    }

    refs
}

/// Search a single reference index, applying weight multiplier to scores
pub fn search_reference(
    ref_idx: &ReferenceIndex,
    query_embedding: &Embedding,
    filter: &SearchFilter,
    limit: usize,
    threshold: f32,
) -> anyhow::Result<Vec<SearchResult>> {
    let _span =
        tracing::info_span!("search_reference", name = %ref_idx.name, weight = ref_idx.weight)
            .entered();
    let mut results = ref_idx.store.search_filtered_with_index(
        query_embedding,
        filter,
        limit,
        threshold,
        ref_idx.index.as_deref(),
    )?;
    for r in &mut results {
        r.score *= ref_idx.weight;
    }
    // Re-filter after weight: results that passed raw threshold may fall
    // below after weighting (consistent with name_only path)
    results.retain(|r| r.score >= threshold);
    Ok(results)
}

/// Search a reference by name (for name_only mode), applying weight
pub fn search_reference_by_name(
    ref_idx: &ReferenceIndex,
    name: &str,
    limit: usize,
    threshold: f32,
) -> anyhow::Result<Vec<SearchResult>> {
    let _span =
        tracing::info_span!("search_reference_by_name", ref_name = %ref_idx.name, query = name)
            .entered();
    let mut results = ref_idx.store.search_by_name(name, limit)?;
    results.retain(|r| r.score * ref_idx.weight >= threshold);
    for r in &mut results {
        r.score *= ref_idx.weight;
    }
    Ok(results)
}

/// Merge primary results with reference results, sorted by score, truncated to limit.
///
/// Deduplicates code results with identical content across stores — keeps the
/// highest-scoring occurrence. Notes (project-local) are never deduplicated.
pub fn merge_results(
    primary: Vec<UnifiedResult>,
    refs: Vec<(String, Vec<SearchResult>)>,
    limit: usize,
) -> Vec<TaggedResult> {
    let mut tagged: Vec<TaggedResult> = Vec::new();

    // Add primary results
    for result in primary {
        tagged.push(TaggedResult {
            result,
            source: None,
        });
    }

    // Add reference results (code only — notes are project-local)
    for (name, results) in refs {
        for r in results {
            tagged.push(TaggedResult {
                result: UnifiedResult::Code(r),
                source: Some(name.clone()),
            });
        }
    }

    // Sort by score descending (highest first)
    tagged.sort_by(|a, b| {
        b.result
            .score()
            .partial_cmp(&a.result.score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Deduplicate code results by content hash (keeps highest-scoring occurrence).
    // Notes are never deduplicated — they're project-local and unique.
    let mut seen_hashes = std::collections::HashSet::new();
    tagged.retain(|t| match &t.result {
        UnifiedResult::Code(r) => {
            let hash = blake3::hash(r.chunk.content.as_bytes());
            seen_hashes.insert(hash)
        }
        UnifiedResult::Note(_) => true,
    });

    tagged.truncate(limit);
    tagged
}

/// Default storage directory for reference indexes
pub fn refs_dir() -> Option<std::path::PathBuf> {
    let dir = dirs::data_local_dir();
    if dir.is_none() {
        tracing::warn!("Could not determine local data directory for reference storage");
    }
    dir.map(|d| d.join("cqs/refs"))
}

/// Validate a reference name (no path separators or traversal)
pub fn validate_ref_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Reference name cannot be empty");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err("Reference name cannot contain '/', '\\', or '..'");
    }
    if name == "." {
        return Err("Reference name cannot be '.'");
    }
    Ok(())
}

/// Get the storage path for a named reference
pub fn ref_path(name: &str) -> Option<std::path::PathBuf> {
    validate_ref_name(name).ok()?;
    refs_dir().map(|d| d.join(name))
}
