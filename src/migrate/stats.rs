//! Run-wide counters shared by every worker.
//!
//! Counters are relaxed atomics; the only consistent read is [`ImportStats::report`]
//! taken after the pool has drained.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Create/update pair for one entity kind.
#[derive(Debug, Default)]
pub struct EntityCounters {
    pub created: Counter,
    pub updated: Counter,
}

/// Legacy catalog that matched neither mapping table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnmappedCatalog {
    pub name: String,
    pub id: i64,
}

impl fmt::Display for UnmappedCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{} [{}]", self.name, self.id))
    }
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub sessions_processed: Counter,
    pub sessions_valid: Counter,
    pub sessions_invalid: Counter,
    pub sessions_skipped: Counter,

    pub nodes_visited: Counter,
    pub nodes_valid: Counter,
    pub nodes_invalid: Counter,
    pub nodes_with_assets: Counter,
    pub nodes_without_assets: Counter,

    pub leaves_processed: Counter,
    pub leaves_missing_hash: Counter,
    pub leaves_empty_hash: Counter,
    pub leaves_unknown_media_type: Counter,
    pub leaves_missing_media_type: Counter,

    pub operations_created: Counter,
    pub groups: EntityCounters,
    pub units: EntityCounters,
    pub files: EntityCounters,
    pub files_promoted: Counter,

    pub languages_unknown: Counter,

    pub jobs_committed: Counter,
    pub jobs_rolled_back: Counter,

    unmapped: Mutex<BTreeMap<UnmappedCatalog, u64>>,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_unmapped(&self, id: i64, name: &str) {
        let key = UnmappedCatalog {
            name: name.to_string(),
            id,
        };
        // A poisoned lock only means a worker panicked mid-insert; the map is still usable.
        let mut guard = self.unmapped.lock().unwrap_or_else(|e| e.into_inner());
        *guard.entry(key).or_insert(0) += 1;
    }

    pub fn report(&self) -> StatsReport {
        let counters = vec![
            ("sessions.processed", self.sessions_processed.get()),
            ("sessions.valid", self.sessions_valid.get()),
            ("sessions.invalid", self.sessions_invalid.get()),
            ("sessions.skipped", self.sessions_skipped.get()),
            ("nodes.visited", self.nodes_visited.get()),
            ("nodes.valid", self.nodes_valid.get()),
            ("nodes.invalid", self.nodes_invalid.get()),
            ("nodes.with_assets", self.nodes_with_assets.get()),
            ("nodes.without_assets", self.nodes_without_assets.get()),
            ("leaves.processed", self.leaves_processed.get()),
            ("leaves.missing_hash", self.leaves_missing_hash.get()),
            ("leaves.empty_hash", self.leaves_empty_hash.get()),
            ("leaves.unknown_media_type", self.leaves_unknown_media_type.get()),
            ("leaves.missing_media_type", self.leaves_missing_media_type.get()),
            ("operations.created", self.operations_created.get()),
            ("groups.created", self.groups.created.get()),
            ("groups.updated", self.groups.updated.get()),
            ("units.created", self.units.created.get()),
            ("units.updated", self.units.updated.get()),
            ("files.created", self.files.created.get()),
            ("files.updated", self.files.updated.get()),
            ("files.promoted", self.files_promoted.get()),
            ("languages.unknown", self.languages_unknown.get()),
            ("jobs.committed", self.jobs_committed.get()),
            ("jobs.rolled_back", self.jobs_rolled_back.get()),
        ];
        let counters = counters
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>();

        let unmapped = self
            .unmapped
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        StatsReport { counters, unmapped }
    }
}

/// Immutable snapshot, ordered by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub counters: BTreeMap<String, u64>,
    pub unmapped: Vec<(UnmappedCatalog, u64)>,
}

impl StatsReport {
    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }

    pub fn committed(&self) -> u64 {
        self.get("jobs.committed")
    }

    pub fn rolled_back(&self) -> u64 {
        self.get("jobs.rolled_back")
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Migration statistics")?;
        for (k, v) in &self.counters {
            writeln!(f, "  {k:<28} {v}")?;
        }
        writeln!(f, "Unmapped catalogs ({})", self.unmapped.len())?;
        for (catalog, hits) in &self.unmapped {
            writeln!(f, "  {catalog:<40} {hits}")?;
        }
        Ok(())
    }
}
