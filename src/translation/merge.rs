/*!
 * Merge engine.
 *
 * Folds validated translations into a target catalog. A value is only
 * written where the destination is missing, unless `force` is set; keys are
 * never removed. Merging the same results twice yields the same catalog.
 */

use log::{debug, warn};

use crate::catalog::Catalog;
use crate::translation::memory::MemoryArtifact;
use crate::translation::validator::Translation;

/// Counters of one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Values written
    pub updated: usize,
    /// Existing values kept because `force` was not set
    pub skipped: usize,
    /// Forced writes whose value was already in place
    pub unchanged: usize,
}

impl MergeStats {
    pub fn has_changes(&self) -> bool {
        self.updated > 0
    }

    pub fn add(&mut self, other: MergeStats) {
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.unchanged += other.unchanged;
    }
}

/// Output catalog and what happened to it
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub catalog: Catalog,
    pub stats: MergeStats,
    /// Keys written, in result order
    pub updated_keys: Vec<String>,
}

impl MergeOutcome {
    pub fn has_changes(&self) -> bool {
        self.stats.has_changes()
    }
}

/// Merge `results` for `target_language` into `existing`.
///
/// Output order is artifact order first, then the remaining destination keys
/// in their existing order.
pub fn merge(
    artifact: &MemoryArtifact,
    target_language: &str,
    existing: &Catalog,
    results: &[Translation],
    force: bool,
) -> MergeOutcome {
    let mut stats = MergeStats::default();
    let mut updated_keys = Vec::new();
    let mut written = Catalog::new();

    for Translation { key, text } in results {
        if !existing.is_missing(key) && !force {
            warn!(
                "Keeping existing {} value for '{}' (use force to overwrite)",
                target_language, key
            );
            stats.skipped += 1;
            continue;
        }
        if force && existing.text(key) == Some(text.as_str()) {
            stats.unchanged += 1;
            continue;
        }
        written.set_text(key.clone(), text.clone());
        updated_keys.push(key.clone());
        stats.updated += 1;
    }

    let mut catalog = Catalog::new();
    for entry in artifact.entries() {
        if let Some(value) = written.get(&entry.key).or_else(|| existing.get(&entry.key)) {
            catalog.insert(entry.key.clone(), value.clone());
        }
    }
    for (key, value) in existing.iter() {
        if !catalog.contains_key(key) {
            catalog.insert(key.clone(), value.clone());
        }
    }
    // Results for keys outside the artifact still land in the output
    for (key, value) in written.iter() {
        if !catalog.contains_key(key) {
            catalog.insert(key.clone(), value.clone());
        }
    }

    debug!(
        "Merged {}: {} updated, {} skipped, {} unchanged",
        target_language, stats.updated, stats.skipped, stats.unchanged
    );

    MergeOutcome {
        catalog,
        stats,
        updated_keys,
    }
}
