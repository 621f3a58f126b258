use anyhow::Result;
use std::path::PathBuf;

use crate::util::env::{env_opt, env_parse, source_db_url, target_db_url};

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source_db_url: String,
    pub target_db_url: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_connections: u32,
    pub catalog_sources_csv: PathBuf,
    pub catalog_tags_csv: PathBuf,
    /// Legacy content type name of the nodes that become units.
    pub leaf_content_type: String,
}

impl MigrationConfig {
    /// Reads the environment. Explicit URLs (from the CLI) win over env keys.
    pub fn from_env(source_url: Option<String>, target_url: Option<String>) -> Result<Self> {
        let source_db_url = match source_url {
            Some(u) => u,
            None => source_db_url()?,
        };
        let target_db_url = match target_url {
            Some(u) => u,
            None => target_db_url()?,
        };
        Ok(Self {
            source_db_url,
            target_db_url,
            workers: env_parse("MIGRATE_WORKERS", 5usize).max(1),
            queue_capacity: env_parse("MIGRATE_QUEUE_CAPACITY", 100usize).max(1),
            max_connections: env_parse("DB_MAX_CONNS", 10u32).max(1),
            catalog_sources_csv: env_opt("CATALOG_SOURCES_CSV")
                .unwrap_or_else(|| "data/catalog_sources.csv".into())
                .into(),
            catalog_tags_csv: env_opt("CATALOG_TAGS_CSV")
                .unwrap_or_else(|| "data/catalog_tags.csv".into())
                .into(),
            leaf_content_type: env_opt("LEGACY_LEAF_CONTENT_TYPE")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| "Lesson".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_urls_override_env() {
        let cfg = MigrationConfig::from_env(
            Some("postgres://a@src/legacy".into()),
            Some("postgres://b@dst/mdb".into()),
        )
        .unwrap();
        assert_eq!(cfg.source_db_url, "postgres://a@src/legacy");
        assert_eq!(cfg.target_db_url, "postgres://b@dst/mdb");
        assert!(cfg.workers >= 1);
        assert!(cfg.queue_capacity >= 1);
    }
}
