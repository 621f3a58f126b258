//! Source reader: enumerates sessions and filters their nodes for validity.

use anyhow::{Context, Result};
use tracing::debug;

use super::stats::ImportStats;
use crate::store::{SessionFilter, SourceNode, SourceSession, SourceStore};

/// A node is migrated iff its content type matches the expected leaf type and
/// it carries at least one asset. Everything else is counted and dropped.
pub fn is_valid_node(node: &SourceNode, leaf_content_type: &str) -> bool {
    node.content_type.eq_ignore_ascii_case(leaf_content_type) && !node.assets.is_empty()
}

pub fn valid_nodes(
    nodes: Vec<SourceNode>,
    leaf_content_type: &str,
    stats: &ImportStats,
) -> Vec<SourceNode> {
    nodes
        .into_iter()
        .filter(|node| {
            stats.nodes_visited.inc();
            if node.assets.is_empty() {
                stats.nodes_without_assets.inc();
            } else {
                stats.nodes_with_assets.inc();
            }
            let ok = is_valid_node(node, leaf_content_type);
            if ok {
                stats.nodes_valid.inc();
            } else {
                stats.nodes_invalid.inc();
                debug!(
                    node_id = node.id,
                    content_type = %node.content_type,
                    assets = node.assets.len(),
                    "node skipped"
                );
            }
            ok
        })
        .collect()
}

pub async fn list_sessions<S: SourceStore>(
    source: &S,
    filter: &SessionFilter,
) -> Result<Vec<SourceSession>> {
    source
        .list_sessions(filter)
        .await
        .context("Enumerate legacy sessions")
}

/// Loads a session's nodes and applies the validity filter.
pub async fn load_session_nodes<S: SourceStore>(
    source: &S,
    session: &SourceSession,
    leaf_content_type: &str,
    stats: &ImportStats,
) -> Result<Vec<SourceNode>> {
    let nodes = source
        .list_nodes(session.id)
        .await
        .with_context(|| format!("Load nodes, legacy session [{}]", session.id))?;
    Ok(valid_nodes(nodes, leaf_content_type, stats))
}
