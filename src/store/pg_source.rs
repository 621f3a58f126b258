use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::{CatalogRef, LeafAsset, NodeDescription, SessionFilter, SourceNode, SourceSession, SourceStore};
use crate::util::db::Db;

/// Read-only view over the legacy catalog database.
#[derive(Clone)]
pub struct PgSource {
    db: Db,
}

impl PgSource {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn load_assets(&self, node_ids: &[i64]) -> Result<HashMap<i64, Vec<LeafAsset>>> {
        let rows = sqlx::query(
            "SELECT cfa.container_id::bigint AS container_id, fa.id::bigint AS id, \
                    COALESCE(fa.name, '') AS name, fa.sha1, COALESCE(fa.size, 0)::bigint AS size, \
                    fa.asset_type, fa.lang_id, fa.secure, fa.playtime_secs, fa.servername_id, \
                    fa.date AT TIME ZONE 'UTC' AS created_at \
             FROM containers_file_assets cfa \
             INNER JOIN file_assets fa ON fa.id = cfa.file_asset_id \
             WHERE cfa.container_id = ANY($1) \
             ORDER BY fa.id",
        )
        .persistent(false)
        .bind(node_ids)
        .fetch_all(&self.db.pool)
        .await?;

        let by_node = rows
            .into_iter()
            .map(|r| {
                let asset = LeafAsset {
                    id: r.get("id"),
                    name: r.get("name"),
                    sha1: r.get::<Option<String>, _>("sha1"),
                    size: r.get("size"),
                    extension: r.get::<Option<String>, _>("asset_type"),
                    lang: r.get::<Option<String>, _>("lang_id"),
                    secure: r.get::<Option<i32>, _>("secure"),
                    duration_secs: r.get::<Option<i32>, _>("playtime_secs"),
                    server: r.get::<Option<String>, _>("servername_id"),
                    created_at: r.get::<Option<DateTime<Utc>>, _>("created_at"),
                };
                (r.get::<i64, _>("container_id"), asset)
            })
            .into_group_map();
        Ok(by_node)
    }
}

#[async_trait::async_trait]
impl SourceStore for PgSource {
    #[instrument(skip(self))]
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SourceSession>> {
        let rows = match &filter.ids {
            Some(ids) => {
                sqlx::query(
                    "SELECT id::bigint AS id, film_date::date AS film_date FROM virtual_lessons \
                     WHERE id = ANY($1) ORDER BY id",
                )
                .persistent(false)
                .bind(ids)
                .fetch_all(&self.db.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id::bigint AS id, film_date::date AS film_date FROM virtual_lessons ORDER BY id",
                )
                .persistent(false)
                .fetch_all(&self.db.pool)
                .await
            }
        }
        .context("Load legacy sessions")?;

        Ok(rows
            .into_iter()
            .map(|r| SourceSession {
                id: r.get("id"),
                film_date: r.get::<Option<NaiveDate>, _>("film_date"),
            })
            .collect())
    }

    async fn list_nodes(&self, session_id: i64) -> Result<Vec<SourceNode>> {
        let rows = sqlx::query(
            "SELECT c.id::bigint AS id, c.name, COALESCE(ct.name, '') AS content_type, \
                    c.filmdate::date AS film_date, COALESCE(c.position, 0) AS position, \
                    c.lang_id, COALESCE(c.secure, 0) AS secure, c.playtime_secs, \
                    c.lecturer_id::int AS lecturer_id \
             FROM containers c \
             LEFT JOIN content_types ct ON ct.id = c.content_type_id \
             WHERE c.virtual_lesson_id = $1 \
             ORDER BY c.position, c.id",
        )
        .persistent(false)
        .bind(session_id)
        .fetch_all(&self.db.pool)
        .await
        .with_context(|| format!("Load nodes, session [{session_id}]"))?;

        let ids: Vec<i64> = rows.iter().map(|r| r.get::<i64, _>("id")).collect();
        let mut assets = self
            .load_assets(&ids)
            .await
            .with_context(|| format!("Load assets, session [{session_id}]"))?;
        debug!(session_id, nodes = ids.len(), "legacy nodes loaded");

        Ok(rows
            .into_iter()
            .map(|r| {
                let id: i64 = r.get("id");
                SourceNode {
                    id,
                    name: r.get::<Option<String>, _>("name"),
                    content_type: r.get("content_type"),
                    film_date: r.get::<Option<NaiveDate>, _>("film_date"),
                    position: r.get("position"),
                    lang: r.get::<Option<String>, _>("lang_id"),
                    secure: r.get("secure"),
                    duration_secs: r.get::<Option<i32>, _>("playtime_secs"),
                    lecturer_id: r.get::<Option<i32>, _>("lecturer_id"),
                    assets: assets.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn node_descriptions(&self, node_id: i64) -> Result<Vec<NodeDescription>> {
        let rows = sqlx::query(
            "SELECT COALESCE(lang_id, '') AS lang_id, container_desc, descr \
             FROM container_descriptions WHERE container_id = $1 ORDER BY id",
        )
        .persistent(false)
        .bind(node_id)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| NodeDescription {
                lang: r.get("lang_id"),
                name: r.get::<Option<String>, _>("container_desc"),
                description: r.get::<Option<String>, _>("descr"),
            })
            .collect())
    }

    async fn node_catalogs(&self, node_id: i64) -> Result<Vec<CatalogRef>> {
        let rows = sqlx::query(
            "SELECT c.id::bigint AS id, COALESCE(c.name, '') AS name \
             FROM catalogs c INNER JOIN catalogs_containers cc ON cc.catalog_id = c.id \
             WHERE cc.container_id = $1 ORDER BY c.id",
        )
        .persistent(false)
        .bind(node_id)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| CatalogRef {
                id: r.get("id"),
                name: r.get("name"),
            })
            .collect())
    }

    async fn server_urls(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT servername, COALESCE(httpurl, '') AS httpurl FROM servers")
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .context("Load legacy servers")?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("servername"), r.get::<String, _>("httpurl")))
            .collect())
    }
}
