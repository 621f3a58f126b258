//! Store seams consumed by the migration engine.
//!
//! The legacy catalog is read through [`SourceStore`]; every write to the
//! normalized catalog happens inside one [`TargetTx`] obtained from a
//! [`TargetStore`]. Postgres implementations live in `pg_source` /
//! `pg_target`; `memory` backs the engine tests.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[cfg(test)]
pub mod memory;
pub mod pg_source;
pub mod pg_target;

/// JSON object stored alongside target entities.
pub type Properties = Map<String, Value>;

// ---------------------------------------------------------------------------
// Legacy side
// ---------------------------------------------------------------------------

/// Which top-level sessions to enumerate. `None` means all of them.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub ids: Option<Vec<i64>>,
}

impl SessionFilter {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Top-level legacy record (one grouped session). One migration job each.
#[derive(Debug, Clone)]
pub struct SourceSession {
    pub id: i64,
    pub film_date: Option<NaiveDate>,
}

/// Legacy sub-unit of a session, with its assets eagerly loaded.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub id: i64,
    pub name: Option<String>,
    pub content_type: String,
    pub film_date: Option<NaiveDate>,
    pub position: i32,
    pub lang: Option<String>,
    pub secure: i32,
    pub duration_secs: Option<i32>,
    pub lecturer_id: Option<i32>,
    pub assets: Vec<LeafAsset>,
}

/// Legacy physical file record.
#[derive(Debug, Clone)]
pub struct LeafAsset {
    pub id: i64,
    pub name: String,
    pub sha1: Option<String>,
    pub size: i64,
    pub extension: Option<String>,
    pub lang: Option<String>,
    pub secure: Option<i32>,
    pub duration_secs: Option<i32>,
    pub server: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NodeDescription {
    pub lang: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRef {
    pub id: i64,
    pub name: String,
}

#[async_trait::async_trait]
pub trait SourceStore: Send + Sync + 'static {
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SourceSession>>;
    /// Children of a session with their assets.
    async fn list_nodes(&self, session_id: i64) -> Result<Vec<SourceNode>>;
    async fn node_descriptions(&self, node_id: i64) -> Result<Vec<NodeDescription>>;
    async fn node_catalogs(&self, node_id: i64) -> Result<Vec<CatalogRef>>;
    /// Server name -> public base URL.
    async fn server_urls(&self) -> Result<HashMap<String, String>>;
}

// ---------------------------------------------------------------------------
// Target side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    DailyLesson,
    SaturdayLesson,
    LessonPart,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::DailyLesson,
        ContentType::SaturdayLesson,
        ContentType::LessonPart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::DailyLesson => "DAILY_LESSON",
            ContentType::SaturdayLesson => "SATURDAY_LESSON",
            ContentType::LessonPart => "LESSON_PART",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation type recorded for every migration job.
pub const IMPORT_OPERATION_TYPE: &str = "import_legacy_catalog";

/// Raw content hash bytes (SHA-1 for everything this engine produces).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    pub fn from_hex(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("empty content hash"));
        }
        let bytes = hex::decode(trimmed).map_err(|e| anyhow!("hex decode {trimmed}: {e}"))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub id: i64,
    pub uid: String,
}

#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub id: i64,
    pub uid: String,
    pub content_type: ContentType,
    pub published: bool,
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupColumn {
    ContentType,
    Published,
    Properties,
}

#[derive(Debug, Clone)]
pub struct TargetUnit {
    pub id: i64,
    pub uid: String,
    pub content_type: ContentType,
    pub published: bool,
    pub secure: i16,
    pub properties: Properties,
}

/// Unit type is set on insert only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitColumn {
    Published,
    Secure,
    Properties,
}

/// Localized text of a unit, unique on (unit_id, language).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitI18n {
    pub unit_id: i64,
    pub language: String,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Group <-> unit association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub group_id: i64,
    pub unit_id: i64,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct TargetFile {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub size: i64,
    pub sha1: ContentHash,
    pub file_type: String,
    pub sub_type: String,
    pub mime_type: Option<String>,
    pub language: Option<String>,
    pub secure: i16,
    pub published: bool,
    pub properties: Properties,
    pub content_unit_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub sha1: ContentHash,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TargetStore: Send + Sync + 'static {
    type Tx: TargetTx;

    async fn begin(&self) -> Result<Self::Tx>;
    /// Materialized taxonomy source paths (`author/source/.../leaf`) -> source id.
    async fn source_paths(&self) -> Result<HashMap<String, i64>>;
    async fn tag_ids(&self) -> Result<HashSet<i64>>;
    /// Person pattern -> person id.
    async fn person_patterns(&self) -> Result<HashMap<String, i64>>;
}

/// One open target transaction. Dropping it without `commit` discards every
/// write made through it.
#[async_trait::async_trait]
pub trait TargetTx: Send {
    async fn create_operation(&mut self, workflow_id: &str) -> Result<Operation>;

    async fn find_group(&mut self, external_id: i64) -> Result<Option<TargetGroup>>;
    async fn insert_group(&mut self, content_type: ContentType) -> Result<TargetGroup>;
    async fn update_group(&mut self, group: &TargetGroup, columns: &[GroupColumn]) -> Result<()>;

    async fn find_unit(&mut self, external_id: i64) -> Result<Option<TargetUnit>>;
    async fn insert_unit(&mut self, content_type: ContentType) -> Result<TargetUnit>;
    async fn update_unit(&mut self, unit: &TargetUnit, columns: &[UnitColumn]) -> Result<()>;
    async fn upsert_unit_i18n(&mut self, row: &UnitI18n) -> Result<()>;

    async fn find_membership(&mut self, group_id: i64, unit_id: i64)
        -> Result<Option<Membership>>;
    async fn insert_membership(&mut self, membership: &Membership) -> Result<()>;
    async fn update_membership(&mut self, membership: &Membership) -> Result<()>;

    async fn unit_sources(&mut self, unit_id: i64) -> Result<Vec<i64>>;
    async fn unit_tags(&mut self, unit_id: i64) -> Result<Vec<i64>>;
    async fn set_unit_sources(&mut self, unit_id: i64, source_ids: &[i64]) -> Result<()>;
    async fn set_unit_tags(&mut self, unit_id: i64, tag_ids: &[i64]) -> Result<()>;
    /// Idempotent.
    async fn add_unit_person(&mut self, unit_id: i64, person_id: i64, role_id: i64)
        -> Result<()>;

    async fn find_file(&mut self, sha1: &ContentHash) -> Result<Option<TargetFile>>;
    async fn insert_file(&mut self, file: &NewFile) -> Result<TargetFile>;
    async fn update_file(&mut self, file: &TargetFile) -> Result<()>;
    /// Idempotent: linking the same pair twice is a no-op.
    async fn link_file_operation(&mut self, file_id: i64, operation_id: i64) -> Result<()>;

    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// Random 8 character alphanumeric public id.
pub fn generate_uid() -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
