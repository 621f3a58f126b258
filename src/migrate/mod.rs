//! Legacy catalog migration engine.
//!
//! Sessions are read from the legacy store, pushed through a bounded worker
//! pool, and each one is written to the target store in its own transaction.

pub mod config;
pub mod context;
pub mod job;
pub mod mapper;
pub mod pool;
pub mod props;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod stats;
pub mod taxonomy;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::store::pg_source::PgSource;
use crate::store::pg_target::PgTarget;
use crate::store::{SessionFilter, SourceStore, TargetStore};
use crate::util::db::Db;
use config::MigrationConfig;
use context::MigrationContext;
use pool::WorkerPool;
use stats::StatsReport;
use taxonomy::CatalogMappings;

/// Runs every session matched by `filter` and returns the final report.
/// Job failures are counted, never returned.
pub async fn migrate<S: SourceStore, T: TargetStore>(
    ctx: Arc<MigrationContext<S, T>>,
    pool: WorkerPool,
    filter: &SessionFilter,
) -> Result<StatsReport> {
    let sessions = source::list_sessions(&ctx.source, filter).await?;
    info!(
        sessions = sessions.len(),
        workers = pool.workers,
        "starting migration"
    );

    let worker_ctx = ctx.clone();
    pool.run(sessions, move |session| {
        let ctx = worker_ctx.clone();
        async move {
            job::process_session(&*ctx, session).await;
        }
    })
    .await;

    Ok(ctx.stats.report())
}

/// Full run against Postgres: open both stores, load the static tables,
/// migrate everything, close.
pub async fn run(cfg: MigrationConfig) -> Result<StatsReport> {
    let started = Instant::now();

    let source_db = Db::connect("source", &cfg.source_db_url, cfg.max_connections)
        .await
        .context("Open source store")?;
    let target_db = Db::connect("target", &cfg.target_db_url, cfg.max_connections)
        .await
        .context("Open target store")?;

    let source = PgSource::new(source_db.clone());
    let target = PgTarget::connect(target_db.clone()).await?;

    let mappings = CatalogMappings::load(&target, &cfg.catalog_sources_csv, &cfg.catalog_tags_csv)
        .await
        .context("Load catalog mappings")?;
    let server_urls = source.server_urls().await?;
    info!(servers = server_urls.len(), "legacy servers loaded");
    let persons = target.person_patterns().await?;

    let ctx = Arc::new(
        MigrationContext::new(
            source,
            target,
            mappings,
            server_urls,
            cfg.leaf_content_type.clone(),
        )
        .with_persons(persons),
    );
    let report = migrate(
        ctx,
        WorkerPool::new(cfg.workers, cfg.queue_capacity),
        &SessionFilter::all(),
    )
    .await;

    source_db.close().await;
    target_db.close().await;

    let report = report?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        committed = report.committed(),
        rolled_back = report.rolled_back(),
        "migration finished"
    );
    Ok(report)
}
