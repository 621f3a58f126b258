use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    generate_uid, ContentHash, ContentType, GroupColumn, Membership, NewFile, Operation,
    Properties, TargetFile, TargetGroup, TargetStore, TargetTx, TargetUnit, UnitColumn, UnitI18n,
    IMPORT_OPERATION_TYPE,
};
use crate::migrate::props::EXTERNAL_ID_KEY;
use crate::util::db::Db;

/// Type ids resolved once at startup from the target's lookup tables.
#[derive(Debug, Clone)]
struct TypeIds {
    by_type: HashMap<ContentType, i64>,
    by_id: HashMap<i64, ContentType>,
    import_operation: i64,
}

impl TypeIds {
    fn id_of(&self, ct: ContentType) -> i64 {
        // Every variant is resolved in `PgTarget::connect`.
        self.by_type.get(&ct).copied().unwrap_or_default()
    }

    fn type_of(&self, id: i64) -> Result<ContentType> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or_else(|| anyhow!("unexpected content type id {id}"))
    }
}

#[derive(Clone)]
pub struct PgTarget {
    db: Db,
    types: Arc<TypeIds>,
}

impl PgTarget {
    /// Resolves content type and operation type ids; missing rows are fatal.
    pub async fn connect(db: Db) -> Result<Self> {
        let mut by_type = HashMap::new();
        let mut by_id = HashMap::new();
        for ct in ContentType::ALL {
            let id: i64 = sqlx::query_scalar("SELECT id FROM content_types WHERE name = $1")
                .persistent(false)
                .bind(ct.as_str())
                .fetch_optional(&db.pool)
                .await?
                .ok_or_else(|| anyhow!("content type {ct} missing in target store"))?;
            by_type.insert(ct, id);
            by_id.insert(id, ct);
        }
        let import_operation: i64 =
            sqlx::query_scalar("SELECT id FROM operation_types WHERE name = $1")
                .persistent(false)
                .bind(IMPORT_OPERATION_TYPE)
                .fetch_optional(&db.pool)
                .await?
                .ok_or_else(|| {
                    anyhow!("operation type {IMPORT_OPERATION_TYPE} missing in target store")
                })?;
        info!(content_types = by_type.len(), "target type registry loaded");

        Ok(Self {
            db,
            types: Arc::new(TypeIds {
                by_type,
                by_id,
                import_operation,
            }),
        })
    }
}

#[async_trait::async_trait]
impl TargetStore for PgTarget {
    type Tx = PgTargetTx;

    async fn begin(&self) -> Result<PgTargetTx> {
        let tx = self.db.pool.begin().await.context("Begin target transaction")?;
        Ok(PgTargetTx {
            tx,
            types: self.types.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn source_paths(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query(
            "WITH RECURSIVE rec_sources AS ( \
               SELECT s.id, concat(a.code, '/', s.name) AS path \
               FROM sources s \
               INNER JOIN authors_sources x ON s.id = x.source_id \
               INNER JOIN authors a ON x.author_id = a.id \
               WHERE s.parent_id IS NULL \
               UNION \
               SELECT s.id, concat(rs.path, '/', s.name) \
               FROM sources s INNER JOIN rec_sources rs ON s.parent_id = rs.id \
             ) \
             SELECT id, path FROM rec_sources",
        )
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await
        .context("Read target sources")?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("path"), r.get::<i64, _>("id")))
            .collect())
    }

    async fn tag_ids(&self) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM tags")
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .context("Fetch tags from target")?;
        Ok(ids.into_iter().collect())
    }

    async fn person_patterns(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query("SELECT id, pattern FROM persons WHERE pattern IS NOT NULL")
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .context("Fetch persons from target")?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("pattern"), r.get::<i64, _>("id")))
            .collect())
    }
}

pub struct PgTargetTx {
    tx: Transaction<'static, Postgres>,
    types: Arc<TypeIds>,
}

fn props_from_row(row: &PgRow) -> Properties {
    match row.get::<Option<Json<Value>>, _>("properties") {
        Some(Json(Value::Object(map))) => map,
        Some(Json(other)) => {
            warn!(value = %other, "non-object properties ignored");
            Properties::new()
        }
        None => Properties::new(),
    }
}

fn props_json(props: &Properties) -> Json<Value> {
    Json(Value::Object(props.clone()))
}

impl PgTargetTx {
    fn group_from_row(&self, row: &PgRow) -> Result<TargetGroup> {
        Ok(TargetGroup {
            id: row.get("id"),
            uid: row.get("uid"),
            content_type: self.types.type_of(row.get("type_id"))?,
            published: row.get("published"),
            properties: props_from_row(row),
        })
    }

    fn unit_from_row(&self, row: &PgRow) -> Result<TargetUnit> {
        Ok(TargetUnit {
            id: row.get("id"),
            uid: row.get("uid"),
            content_type: self.types.type_of(row.get("type_id"))?,
            published: row.get("published"),
            secure: row.get("secure"),
            properties: props_from_row(row),
        })
    }

    fn file_from_row(row: &PgRow) -> TargetFile {
        TargetFile {
            id: row.get("id"),
            uid: row.get("uid"),
            name: row.get("name"),
            size: row.get("size"),
            sha1: ContentHash::from_bytes(row.get::<Vec<u8>, _>("sha1")),
            file_type: row.get("type"),
            sub_type: row.get("sub_type"),
            mime_type: row.get::<Option<String>, _>("mime_type"),
            language: row.get::<Option<String>, _>("language"),
            secure: row.get("secure"),
            published: row.get("published"),
            properties: props_from_row(row),
            content_unit_id: row.get::<Option<i64>, _>("content_unit_id"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }
    }

    async fn replace_links(
        &mut self,
        table: &str,
        column: &str,
        unit_id: i64,
        ids: &[i64],
    ) -> Result<()> {
        sqlx::query(&format!(
            "DELETE FROM {table} WHERE content_unit_id = $1 AND NOT ({column} = ANY($2))"
        ))
        .persistent(false)
        .bind(unit_id)
        .bind(ids)
        .execute(&mut *self.tx)
        .await?;
        sqlx::query(&format!(
            "INSERT INTO {table} (content_unit_id, {column}) \
             SELECT $1, x FROM unnest($2::bigint[]) AS x ON CONFLICT DO NOTHING"
        ))
        .persistent(false)
        .bind(unit_id)
        .bind(ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

const GROUP_COLUMNS: &str = "id, uid, type_id, published, properties";
const UNIT_COLUMNS: &str = "id, uid, type_id, published, secure, properties";
const FILE_COLUMNS: &str = "id, uid, name, size, sha1, type, sub_type, mime_type, language, \
                            secure, published, properties, content_unit_id, created_at";

#[async_trait::async_trait]
impl TargetTx for PgTargetTx {
    async fn create_operation(&mut self, workflow_id: &str) -> Result<Operation> {
        let uid = generate_uid();
        let props = serde_json::json!({ "workflow_id": workflow_id });
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO operations (uid, type_id, properties) VALUES ($1, $2, $3) RETURNING id",
        )
        .persistent(false)
        .bind(&uid)
        .bind(self.types.import_operation)
        .bind(Json(props))
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(Operation { id, uid })
    }

    async fn find_group(&mut self, external_id: i64) -> Result<Option<TargetGroup>> {
        let row = sqlx::query(&format!(
            "SELECT {GROUP_COLUMNS} FROM collections \
             WHERE (properties->>'{EXTERNAL_ID_KEY}')::bigint = $1 LIMIT 1"
        ))
        .persistent(false)
        .bind(external_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| self.group_from_row(&r)).transpose()
    }

    async fn insert_group(&mut self, content_type: ContentType) -> Result<TargetGroup> {
        let row = sqlx::query(&format!(
            "INSERT INTO collections (uid, type_id, published, properties) \
             VALUES ($1, $2, false, '{{}}'::jsonb) RETURNING {GROUP_COLUMNS}"
        ))
        .persistent(false)
        .bind(generate_uid())
        .bind(self.types.id_of(content_type))
        .fetch_one(&mut *self.tx)
        .await?;
        self.group_from_row(&row)
    }

    async fn update_group(&mut self, group: &TargetGroup, columns: &[GroupColumn]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE collections SET ");
        let mut set = qb.separated(", ");
        for col in columns {
            match col {
                GroupColumn::ContentType => {
                    set.push("type_id = ")
                        .push_bind_unseparated(self.types.id_of(group.content_type));
                }
                GroupColumn::Published => {
                    set.push("published = ").push_bind_unseparated(group.published);
                }
                GroupColumn::Properties => {
                    set.push("properties = ")
                        .push_bind_unseparated(props_json(&group.properties));
                }
            }
        }
        qb.push(" WHERE id = ").push_bind(group.id);
        qb.build().persistent(false).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn find_unit(&mut self, external_id: i64) -> Result<Option<TargetUnit>> {
        let row = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM content_units \
             WHERE (properties->>'{EXTERNAL_ID_KEY}')::bigint = $1 LIMIT 1"
        ))
        .persistent(false)
        .bind(external_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(|r| self.unit_from_row(&r)).transpose()
    }

    async fn insert_unit(&mut self, content_type: ContentType) -> Result<TargetUnit> {
        let row = sqlx::query(&format!(
            "INSERT INTO content_units (uid, type_id, published, secure, properties) \
             VALUES ($1, $2, false, 0, '{{}}'::jsonb) RETURNING {UNIT_COLUMNS}"
        ))
        .persistent(false)
        .bind(generate_uid())
        .bind(self.types.id_of(content_type))
        .fetch_one(&mut *self.tx)
        .await?;
        self.unit_from_row(&row)
    }

    async fn update_unit(&mut self, unit: &TargetUnit, columns: &[UnitColumn]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE content_units SET ");
        let mut set = qb.separated(", ");
        for col in columns {
            match col {
                UnitColumn::Published => {
                    set.push("published = ").push_bind_unseparated(unit.published);
                }
                UnitColumn::Secure => {
                    set.push("secure = ").push_bind_unseparated(unit.secure);
                }
                UnitColumn::Properties => {
                    set.push("properties = ")
                        .push_bind_unseparated(props_json(&unit.properties));
                }
            }
        }
        qb.push(" WHERE id = ").push_bind(unit.id);
        qb.build().persistent(false).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn upsert_unit_i18n(&mut self, row: &UnitI18n) -> Result<()> {
        sqlx::query(
            "INSERT INTO content_unit_i18n (content_unit_id, language, name, description) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (content_unit_id, language) \
             DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description",
        )
        .persistent(false)
        .bind(row.unit_id)
        .bind(&row.language)
        .bind(&row.name)
        .bind(&row.description)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_membership(
        &mut self,
        group_id: i64,
        unit_id: i64,
    ) -> Result<Option<Membership>> {
        let row = sqlx::query(
            "SELECT collection_id, content_unit_id, name, position FROM collections_content_units \
             WHERE collection_id = $1 AND content_unit_id = $2",
        )
        .persistent(false)
        .bind(group_id)
        .bind(unit_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|r| Membership {
            group_id: r.get("collection_id"),
            unit_id: r.get("content_unit_id"),
            name: r.get("name"),
            position: r.get("position"),
        }))
    }

    async fn insert_membership(&mut self, m: &Membership) -> Result<()> {
        sqlx::query(
            "INSERT INTO collections_content_units (collection_id, content_unit_id, name, position) \
             VALUES ($1, $2, $3, $4)",
        )
        .persistent(false)
        .bind(m.group_id)
        .bind(m.unit_id)
        .bind(&m.name)
        .bind(m.position)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_membership(&mut self, m: &Membership) -> Result<()> {
        sqlx::query(
            "UPDATE collections_content_units SET name = $3, position = $4 \
             WHERE collection_id = $1 AND content_unit_id = $2",
        )
        .persistent(false)
        .bind(m.group_id)
        .bind(m.unit_id)
        .bind(&m.name)
        .bind(m.position)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn unit_sources(&mut self, unit_id: i64) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT source_id FROM content_units_sources WHERE content_unit_id = $1",
        )
        .persistent(false)
        .bind(unit_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn unit_tags(&mut self, unit_id: i64) -> Result<Vec<i64>> {
        Ok(
            sqlx::query_scalar("SELECT tag_id FROM content_units_tags WHERE content_unit_id = $1")
                .persistent(false)
                .bind(unit_id)
                .fetch_all(&mut *self.tx)
                .await?,
        )
    }

    async fn set_unit_sources(&mut self, unit_id: i64, source_ids: &[i64]) -> Result<()> {
        self.replace_links("content_units_sources", "source_id", unit_id, source_ids)
            .await
    }

    async fn set_unit_tags(&mut self, unit_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.replace_links("content_units_tags", "tag_id", unit_id, tag_ids)
            .await
    }

    async fn add_unit_person(&mut self, unit_id: i64, person_id: i64, role_id: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO content_units_persons (content_unit_id, person_id, role_id) \
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .persistent(false)
        .bind(unit_id)
        .bind(person_id)
        .bind(role_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_file(&mut self, sha1: &ContentHash) -> Result<Option<TargetFile>> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE sha1 = $1 LIMIT 1"
        ))
        .persistent(false)
        .bind(sha1.as_bytes())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.as_ref().map(Self::file_from_row))
    }

    async fn insert_file(&mut self, file: &NewFile) -> Result<TargetFile> {
        let row = sqlx::query(&format!(
            "INSERT INTO files (uid, name, size, sha1, type, sub_type, secure, published, properties, created_at) \
             VALUES ($1, $2, $3, $4, '', '', 0, false, '{{}}'::jsonb, $5) RETURNING {FILE_COLUMNS}"
        ))
        .persistent(false)
        .bind(generate_uid())
        .bind(&file.name)
        .bind(file.size)
        .bind(file.sha1.as_bytes())
        .bind(file.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(Self::file_from_row(&row))
    }

    async fn update_file(&mut self, file: &TargetFile) -> Result<()> {
        sqlx::query(
            "UPDATE files SET name = $2, size = $3, sha1 = $4, type = $5, sub_type = $6, \
                    mime_type = $7, language = $8, secure = $9, published = $10, \
                    properties = $11, content_unit_id = $12 \
             WHERE id = $1",
        )
        .persistent(false)
        .bind(file.id)
        .bind(&file.name)
        .bind(file.size)
        .bind(file.sha1.as_bytes())
        .bind(&file.file_type)
        .bind(&file.sub_type)
        .bind(&file.mime_type)
        .bind(&file.language)
        .bind(file.secure)
        .bind(file.published)
        .bind(props_json(&file.properties))
        .bind(file.content_unit_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn link_file_operation(&mut self, file_id: i64, operation_id: i64) -> Result<()> {
        // Two assets of one session may share a hash, hence DO NOTHING.
        sqlx::query(
            "INSERT INTO files_operations (file_id, operation_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .persistent(false)
        .bind(file_id)
        .bind(operation_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
