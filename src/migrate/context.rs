use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::registry::{std_lang, LANG_UNKNOWN};
use super::stats::ImportStats;
use super::taxonomy::CatalogMappings;
use crate::store::{SourceStore, TargetStore};

/// Everything a worker needs, built once at startup and shared read-only.
pub struct MigrationContext<S, T> {
    pub source: S,
    pub target: T,
    pub mappings: CatalogMappings,
    /// Legacy server name -> public base URL.
    pub server_urls: HashMap<String, String>,
    pub stats: Arc<ImportStats>,
    pub leaf_content_type: String,
    /// Person pattern -> target person id.
    pub persons: HashMap<String, i64>,
}

impl<S: SourceStore, T: TargetStore> MigrationContext<S, T> {
    pub fn new(
        source: S,
        target: T,
        mappings: CatalogMappings,
        server_urls: HashMap<String, String>,
        leaf_content_type: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            mappings,
            server_urls,
            stats: Arc::new(ImportStats::new()),
            leaf_content_type: leaf_content_type.into(),
            persons: HashMap::new(),
        }
    }

    pub fn with_persons(mut self, persons: HashMap<String, i64>) -> Self {
        self.persons = persons;
        self
    }

    /// Normalizes a legacy language code, counting codes that fall back to
    /// [`LANG_UNKNOWN`].
    pub fn language(&self, raw: &str, entity: &'static str, id: i64) -> &'static str {
        let lang = std_lang(raw);
        if lang == LANG_UNKNOWN && !raw.trim().eq_ignore_ascii_case(LANG_UNKNOWN) {
            self.stats.languages_unknown.inc();
            debug!(entity, id, raw, "unknown language code");
        }
        lang
    }

    pub fn server_url(&self, server: Option<&str>) -> Option<&str> {
        server
            .and_then(|s| self.server_urls.get(s.trim()))
            .map(String::as_str)
            .filter(|u| !u.is_empty())
    }
}
