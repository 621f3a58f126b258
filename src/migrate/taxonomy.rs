//! Static catalog -> taxonomy tables, loaded once per run.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::store::{CatalogRef, TargetStore};

/// Where a legacy catalog lands in the target taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogMatch {
    Source(i64),
    Tag(i64),
    Unmapped { id: i64, name: String },
}

#[derive(Debug, Clone, Default)]
pub struct CatalogMappings {
    sources: HashMap<i64, i64>,
    tags: HashMap<i64, i64>,
}

/// Resolved matches of one node, deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomyLinks {
    pub sources: BTreeSet<i64>,
    pub tags: BTreeSet<i64>,
    pub unmapped: Vec<CatalogRef>,
}

fn csv_reader<R: Read>(rdr: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(rdr)
}

fn parse_id(raw: Option<&str>, what: &str, row: usize) -> Result<i64> {
    let raw = raw.unwrap_or("").trim();
    raw.parse::<i64>()
        .with_context(|| format!("Bad {what}, row [{row}]: {raw:?}"))
}

impl CatalogMappings {
    /// Parses both tables. Catalog -> source rows carry the catalog id in the
    /// first column and the materialized source path in the third; catalog ->
    /// tag rows carry catalog id and tag id. A malformed id is fatal, a path or
    /// tag that the target does not know is only a warning.
    pub fn from_readers<R1: Read, R2: Read>(
        sources_csv: R1,
        tags_csv: R2,
        source_paths: &HashMap<String, i64>,
        tag_ids: &HashSet<i64>,
    ) -> Result<Self> {
        let mut sources = HashMap::new();
        for (i, rec) in csv_reader(sources_csv).records().enumerate() {
            let rec = rec.with_context(|| format!("Read catalog sources, row [{i}]"))?;
            let catalog_id = parse_id(rec.get(0), "catalog_id", i)?;
            let path = rec.get(2).unwrap_or("").trim();
            match source_paths.get(path) {
                Some(&source_id) => {
                    sources.insert(catalog_id, source_id);
                }
                None => warn!(catalog_id, path, "unknown source path"),
            }
        }

        let mut tags = HashMap::new();
        for (i, rec) in csv_reader(tags_csv).records().enumerate() {
            let rec = rec.with_context(|| format!("Read catalog tags, row [{i}]"))?;
            let catalog_id = parse_id(rec.get(0), "catalog_id", i)?;
            let tag_id = parse_id(rec.get(1), "tag_id", i)?;
            if tag_ids.contains(&tag_id) {
                tags.insert(catalog_id, tag_id);
            } else {
                warn!(catalog_id, tag_id, "unknown tag");
            }
        }

        info!(
            sources = sources.len(),
            tags = tags.len(),
            "catalog mappings loaded"
        );
        Ok(Self { sources, tags })
    }

    pub async fn load<T: TargetStore>(
        target: &T,
        sources_csv: &Path,
        tags_csv: &Path,
    ) -> Result<Self> {
        let source_paths = target.source_paths().await?;
        let tag_ids = target.tag_ids().await?;
        let sources = File::open(sources_csv)
            .with_context(|| format!("Open catalog sources {}", sources_csv.display()))?;
        let tags = File::open(tags_csv)
            .with_context(|| format!("Open catalog tags {}", tags_csv.display()))?;
        Self::from_readers(sources, tags, &source_paths, &tag_ids)
    }

    /// Source table wins over tag table.
    pub fn resolve(&self, catalog: &CatalogRef) -> CatalogMatch {
        if let Some(&id) = self.sources.get(&catalog.id) {
            CatalogMatch::Source(id)
        } else if let Some(&id) = self.tags.get(&catalog.id) {
            CatalogMatch::Tag(id)
        } else {
            CatalogMatch::Unmapped {
                id: catalog.id,
                name: catalog.name.clone(),
            }
        }
    }

    pub fn resolve_all(&self, catalogs: &[CatalogRef]) -> TaxonomyLinks {
        let mut links = TaxonomyLinks::default();
        for c in catalogs {
            match self.resolve(c) {
                CatalogMatch::Source(id) => {
                    links.sources.insert(id);
                }
                CatalogMatch::Tag(id) => {
                    links.tags.insert(id);
                }
                CatalogMatch::Unmapped { .. } => links.unmapped.push(c.clone()),
            }
        }
        links
    }

    #[cfg(test)]
    pub fn from_pairs(sources: &[(i64, i64)], tags: &[(i64, i64)]) -> Self {
        Self {
            sources: sources.iter().copied().collect(),
            tags: tags.iter().copied().collect(),
        }
    }
}
