//! In-process stores for engine tests.
//!
//! `MemoryTarget` hands out one transaction at a time: `begin` takes the state
//! lock and keeps a snapshot that is restored on rollback or drop.

use anyhow::{bail, Result};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    generate_uid, CatalogRef, ContentHash, ContentType, GroupColumn, Membership, NewFile,
    NodeDescription, Operation, Properties, SessionFilter, SourceNode, SourceSession, SourceStore,
    TargetFile, TargetGroup, TargetStore, TargetTx, TargetUnit, UnitColumn, UnitI18n,
};
use crate::migrate::props::external_id;

#[derive(Debug, Default)]
pub struct MemorySource {
    pub sessions: Vec<SourceSession>,
    pub nodes: HashMap<i64, Vec<SourceNode>>,
    pub descriptions: HashMap<i64, Vec<NodeDescription>>,
    pub catalogs: HashMap<i64, Vec<CatalogRef>>,
    pub servers: HashMap<String, String>,
    /// Sessions whose node listing fails.
    pub broken_sessions: HashSet<i64>,
}

#[async_trait::async_trait]
impl SourceStore for MemorySource {
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SourceSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| filter.ids.as_ref().map_or(true, |ids| ids.contains(&s.id)))
            .cloned()
            .collect())
    }

    async fn list_nodes(&self, session_id: i64) -> Result<Vec<SourceNode>> {
        if self.broken_sessions.contains(&session_id) {
            bail!("broken relation, session [{session_id}]");
        }
        Ok(self.nodes.get(&session_id).cloned().unwrap_or_default())
    }

    async fn node_descriptions(&self, node_id: i64) -> Result<Vec<NodeDescription>> {
        Ok(self.descriptions.get(&node_id).cloned().unwrap_or_default())
    }

    async fn node_catalogs(&self, node_id: i64) -> Result<Vec<CatalogRef>> {
        Ok(self.catalogs.get(&node_id).cloned().unwrap_or_default())
    }

    async fn server_urls(&self) -> Result<HashMap<String, String>> {
        Ok(self.servers.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetState {
    next_id: i64,
    pub operations: BTreeMap<i64, (Operation, String)>,
    pub groups: BTreeMap<i64, TargetGroup>,
    pub units: BTreeMap<i64, TargetUnit>,
    pub unit_i18n: BTreeMap<(i64, String), UnitI18n>,
    pub memberships: BTreeMap<(i64, i64), Membership>,
    pub unit_sources: BTreeMap<i64, BTreeSet<i64>>,
    pub unit_tags: BTreeMap<i64, BTreeSet<i64>>,
    /// (unit, person, role)
    pub unit_persons: BTreeSet<(i64, i64, i64)>,
    pub files: BTreeMap<i64, TargetFile>,
    pub file_operations: BTreeSet<(i64, i64)>,
}

impl TargetState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn group_by_external_id(&self, id: i64) -> Option<&TargetGroup> {
        self.groups
            .values()
            .find(|g| external_id(&g.properties) == Some(id))
    }

    pub fn unit_by_external_id(&self, id: i64) -> Option<&TargetUnit> {
        self.units
            .values()
            .find(|u| external_id(&u.properties) == Some(id))
    }
}

#[derive(Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
    pub source_paths: HashMap<String, i64>,
    pub tags: HashSet<i64>,
    pub persons: HashMap<String, i64>,
    /// Legacy node ids whose unit update fails.
    pub failing_units: Arc<HashSet<i64>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, node_ids: impl IntoIterator<Item = i64>) -> Self {
        self.failing_units = Arc::new(node_ids.into_iter().collect());
        self
    }

    pub async fn snapshot(&self) -> TargetState {
        self.state.lock().await.clone()
    }

    /// Direct write outside any job, e.g. a hand-curated link.
    pub async fn with_state<R>(&self, f: impl FnOnce(&mut TargetState) -> R) -> R {
        let mut guard = self.state.lock().await;
        f(&mut guard)
    }

    pub async fn seed_file(&self, sha1: ContentHash, name: &str) -> i64 {
        self.with_state(|s| {
            let id = s.next_id();
            s.files.insert(id, blank_file(id, name, sha1, 0));
            id
        })
        .await
    }
}

fn blank_file(id: i64, name: &str, sha1: ContentHash, size: i64) -> TargetFile {
    TargetFile {
        id,
        uid: generate_uid(),
        name: name.to_string(),
        size,
        sha1,
        file_type: String::new(),
        sub_type: String::new(),
        mime_type: None,
        language: None,
        secure: 0,
        published: false,
        properties: Properties::new(),
        content_unit_id: None,
        created_at: Utc::now(),
    }
}

#[async_trait::async_trait]
impl TargetStore for MemoryTarget {
    type Tx = MemoryTargetTx;

    async fn begin(&self) -> Result<MemoryTargetTx> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryTargetTx {
            state: guard,
            snapshot: Some(snapshot),
            failing_units: self.failing_units.clone(),
        })
    }

    async fn source_paths(&self) -> Result<HashMap<String, i64>> {
        Ok(self.source_paths.clone())
    }

    async fn tag_ids(&self) -> Result<HashSet<i64>> {
        Ok(self.tags.clone())
    }

    async fn person_patterns(&self) -> Result<HashMap<String, i64>> {
        Ok(self.persons.clone())
    }
}

pub struct MemoryTargetTx {
    state: OwnedMutexGuard<TargetState>,
    snapshot: Option<TargetState>,
    failing_units: Arc<HashSet<i64>>,
}

impl Drop for MemoryTargetTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

#[async_trait::async_trait]
impl TargetTx for MemoryTargetTx {
    async fn create_operation(&mut self, workflow_id: &str) -> Result<Operation> {
        let id = self.state.next_id();
        let op = Operation {
            id,
            uid: generate_uid(),
        };
        self.state
            .operations
            .insert(id, (op.clone(), workflow_id.to_string()));
        Ok(op)
    }

    async fn find_group(&mut self, id: i64) -> Result<Option<TargetGroup>> {
        Ok(self.state.group_by_external_id(id).cloned())
    }

    async fn insert_group(&mut self, content_type: ContentType) -> Result<TargetGroup> {
        let id = self.state.next_id();
        let g = TargetGroup {
            id,
            uid: generate_uid(),
            content_type,
            published: false,
            properties: Properties::new(),
        };
        self.state.groups.insert(id, g.clone());
        Ok(g)
    }

    async fn update_group(&mut self, group: &TargetGroup, columns: &[GroupColumn]) -> Result<()> {
        let Some(row) = self.state.groups.get_mut(&group.id) else {
            bail!("no group {}", group.id);
        };
        for col in columns {
            match col {
                GroupColumn::ContentType => row.content_type = group.content_type,
                GroupColumn::Published => row.published = group.published,
                GroupColumn::Properties => row.properties = group.properties.clone(),
            }
        }
        Ok(())
    }

    async fn find_unit(&mut self, id: i64) -> Result<Option<TargetUnit>> {
        Ok(self.state.unit_by_external_id(id).cloned())
    }

    async fn insert_unit(&mut self, content_type: ContentType) -> Result<TargetUnit> {
        let id = self.state.next_id();
        let u = TargetUnit {
            id,
            uid: generate_uid(),
            content_type,
            published: false,
            secure: 0,
            properties: Properties::new(),
        };
        self.state.units.insert(id, u.clone());
        Ok(u)
    }

    async fn update_unit(&mut self, unit: &TargetUnit, columns: &[UnitColumn]) -> Result<()> {
        if let Some(ext) = external_id(&unit.properties) {
            if self.failing_units.contains(&ext) {
                bail!("injected failure, unit of legacy node [{ext}]");
            }
        }
        let Some(row) = self.state.units.get_mut(&unit.id) else {
            bail!("no unit {}", unit.id);
        };
        for col in columns {
            match col {
                UnitColumn::Published => row.published = unit.published,
                UnitColumn::Secure => row.secure = unit.secure,
                UnitColumn::Properties => row.properties = unit.properties.clone(),
            }
        }
        Ok(())
    }

    async fn upsert_unit_i18n(&mut self, row: &UnitI18n) -> Result<()> {
        self.state
            .unit_i18n
            .insert((row.unit_id, row.language.clone()), row.clone());
        Ok(())
    }

    async fn find_membership(
        &mut self,
        group_id: i64,
        unit_id: i64,
    ) -> Result<Option<Membership>> {
        Ok(self.state.memberships.get(&(group_id, unit_id)).cloned())
    }

    async fn insert_membership(&mut self, m: &Membership) -> Result<()> {
        let key = (m.group_id, m.unit_id);
        if self.state.memberships.contains_key(&key) {
            bail!("duplicate membership {key:?}");
        }
        self.state.memberships.insert(key, m.clone());
        Ok(())
    }

    async fn update_membership(&mut self, m: &Membership) -> Result<()> {
        match self.state.memberships.get_mut(&(m.group_id, m.unit_id)) {
            Some(row) => {
                *row = m.clone();
                Ok(())
            }
            None => bail!("no membership ({}, {})", m.group_id, m.unit_id),
        }
    }

    async fn unit_sources(&mut self, unit_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .unit_sources
            .get(&unit_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn unit_tags(&mut self, unit_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .state
            .unit_tags
            .get(&unit_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn set_unit_sources(&mut self, unit_id: i64, source_ids: &[i64]) -> Result<()> {
        self.state
            .unit_sources
            .insert(unit_id, source_ids.iter().copied().collect());
        Ok(())
    }

    async fn set_unit_tags(&mut self, unit_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.state
            .unit_tags
            .insert(unit_id, tag_ids.iter().copied().collect());
        Ok(())
    }

    async fn add_unit_person(&mut self, unit_id: i64, person_id: i64, role_id: i64) -> Result<()> {
        self.state.unit_persons.insert((unit_id, person_id, role_id));
        Ok(())
    }

    async fn find_file(&mut self, sha1: &ContentHash) -> Result<Option<TargetFile>> {
        Ok(self
            .state
            .files
            .values()
            .find(|f| &f.sha1 == sha1)
            .cloned())
    }

    async fn insert_file(&mut self, file: &NewFile) -> Result<TargetFile> {
        let id = self.state.next_id();
        let mut row = blank_file(id, &file.name, file.sha1.clone(), file.size);
        row.created_at = file.created_at;
        self.state.files.insert(id, row.clone());
        Ok(row)
    }

    async fn update_file(&mut self, file: &TargetFile) -> Result<()> {
        match self.state.files.get_mut(&file.id) {
            Some(row) => {
                *row = file.clone();
                Ok(())
            }
            None => bail!("no file {}", file.id),
        }
    }

    async fn link_file_operation(&mut self, file_id: i64, operation_id: i64) -> Result<()> {
        self.state.file_operations.insert((file_id, operation_id));
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        // Drop restores the snapshot.
        Ok(())
    }
}
