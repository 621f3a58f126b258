//! One job per legacy session: everything below the session is written in a
//! single target transaction that commits or rolls back as a whole.

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use super::context::MigrationContext;
use super::mapper::{map_group, map_unit, publish_group, publish_unit};
use super::resolver::resolve_file;
use super::source::load_session_nodes;
use crate::store::{SourceNode, SourceSession, SourceStore, TargetStore, TargetTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Committed,
    RolledBack,
    /// No valid nodes; nothing was written.
    Invalid,
    /// The legacy subtree could not be read.
    Skipped,
}

pub async fn process_session<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    session: SourceSession,
) -> JobOutcome {
    let stats = &ctx.stats;
    info!(session_id = session.id, "processing session");
    stats.sessions_processed.inc();

    let nodes =
        match load_session_nodes(&ctx.source, &session, &ctx.leaf_content_type, stats).await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(session_id = session.id, error = ?e, "source read failed, session skipped");
                stats.sessions_skipped.inc();
                return JobOutcome::Skipped;
            }
        };
    if nodes.is_empty() {
        warn!(session_id = session.id, "invalid session");
        stats.sessions_invalid.inc();
        return JobOutcome::Invalid;
    }
    stats.sessions_valid.inc();

    let mut tx = match ctx.target.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            error!(session_id = session.id, error = ?e, "begin failed");
            stats.jobs_rolled_back.inc();
            return JobOutcome::RolledBack;
        }
    };

    match write_session(ctx, &mut tx, &session, &nodes).await {
        Ok(()) => match tx.commit().await {
            Ok(()) => {
                stats.jobs_committed.inc();
                JobOutcome::Committed
            }
            Err(e) => {
                error!(session_id = session.id, error = ?e, "commit failed");
                stats.jobs_rolled_back.inc();
                JobOutcome::RolledBack
            }
        },
        Err(e) => {
            error!(session_id = session.id, error = ?e, "job failed, rolling back");
            if let Err(rb) = tx.rollback().await {
                error!(session_id = session.id, error = ?rb, "rollback failed");
            }
            stats.jobs_rolled_back.inc();
            JobOutcome::RolledBack
        }
    }
}

async fn write_session<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    session: &SourceSession,
    nodes: &[SourceNode],
) -> Result<()> {
    let operation = tx
        .create_operation(&session.id.to_string())
        .await
        .with_context(|| format!("Create operation, legacy session [{}]", session.id))?;
    ctx.stats.operations_created.inc();

    let mut group = map_group(ctx, tx, session).await?;

    let mut any_unit_published = false;
    for node in nodes {
        info!(session_id = session.id, node_id = node.id, "processing node");
        let mut unit = map_unit(ctx, tx, node, &group).await?;

        let mut any_file_published = false;
        for asset in &node.assets {
            if let Some(file) = resolve_file(ctx, tx, asset, &unit, &operation)
                .await
                .with_context(|| format!("Legacy asset [{}]", asset.id))?
            {
                any_file_published |= file.published;
            }
        }

        if any_file_published {
            publish_unit(tx, &mut unit).await?;
        }
        any_unit_published |= unit.published;
    }

    if any_unit_published {
        publish_group(tx, &mut group).await?;
    }
    Ok(())
}
