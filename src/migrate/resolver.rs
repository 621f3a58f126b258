//! Content resolver: legacy asset -> canonical target file, keyed by SHA-1.

use anyhow::{Context, Result};
use chrono::Utc;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use super::context::MigrationContext;
use super::props::Patch;
use super::registry::{map_secure, media_type_by_extension, SEC_PUBLIC};
use crate::store::{
    ContentHash, LeafAsset, NewFile, Operation, SourceStore, TargetFile, TargetStore, TargetTx,
    TargetUnit,
};

/// SHA-1 of zero bytes. Assets carrying it are unusable and never become files.
pub const EMPTY_FILE_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

/// Deterministic placeholder hash for an asset whose real hash is unknown.
pub fn surrogate_hash(asset_id: i64) -> String {
    let digest = Sha1::digest(asset_id.to_string().as_bytes());
    format!("{digest:x}")
}

/// How the file row was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created,
    Existing,
    /// Found under its surrogate hash and re-keyed to the real one.
    Promoted,
}

fn real_hash(asset: &LeafAsset) -> Option<&str> {
    asset
        .sha1
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
}

async fn lookup<Tx: TargetTx>(
    tx: &mut Tx,
    asset: &LeafAsset,
) -> Result<(TargetFile, Resolution)> {
    let surrogate = ContentHash::from_hex(&surrogate_hash(asset.id))?;
    let hash = match real_hash(asset) {
        Some(h) => ContentHash::from_hex(h)
            .with_context(|| format!("Bad sha1, legacy asset [{}]", asset.id))?,
        None => surrogate.clone(),
    };

    if let Some(file) = tx
        .find_file(&hash)
        .await
        .with_context(|| format!("Lookup file {hash}"))?
    {
        return Ok((file, Resolution::Existing));
    }

    if hash != surrogate {
        // The asset may have been imported before its real hash was known.
        if let Some(mut file) = tx
            .find_file(&surrogate)
            .await
            .with_context(|| format!("Second file lookup, legacy asset [{}]", asset.id))?
        {
            debug!(asset_id = asset.id, file_id = file.id, "promoting surrogate hash");
            file.sha1 = hash;
            return Ok((file, Resolution::Promoted));
        }
    }

    let file = tx
        .insert_file(&NewFile {
            name: asset.name.clone(),
            sha1: hash,
            size: asset.size,
            created_at: asset.created_at.unwrap_or_else(Utc::now),
        })
        .await
        .with_context(|| format!("Create file, legacy asset [{}]", asset.id))?;
    Ok((file, Resolution::Created))
}

/// Resolves one asset inside the job transaction, refreshes its metadata,
/// attaches it to `unit` and records it under `operation`.
///
/// Returns `None` for the empty-file hash.
pub async fn resolve_file<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    asset: &LeafAsset,
    unit: &TargetUnit,
    operation: &Operation,
) -> Result<Option<TargetFile>> {
    let stats = &ctx.stats;
    stats.leaves_processed.inc();

    match real_hash(asset) {
        Some(h) if h.eq_ignore_ascii_case(EMPTY_FILE_SHA1) => {
            stats.leaves_empty_hash.inc();
            return Ok(None);
        }
        Some(_) => {}
        None => stats.leaves_missing_hash.inc(),
    }

    let (mut file, resolution) = lookup(tx, asset).await?;
    match resolution {
        Resolution::Created => stats.files.created.inc(),
        Resolution::Existing => stats.files.updated.inc(),
        Resolution::Promoted => {
            stats.files.updated.inc();
            stats.files_promoted.inc();
        }
    }

    match asset.extension.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(ext) => match media_type_by_extension(ext) {
            Some(mt) => {
                file.file_type = mt.kind.to_string();
                file.sub_type = mt.sub_type.to_string();
                file.mime_type = Some(mt.mime_type.to_string()).filter(|m| !m.is_empty());
            }
            None => stats.leaves_unknown_media_type.inc(),
        },
        None => stats.leaves_missing_media_type.inc(),
    }

    if let Some(lang) = asset.lang.as_deref() {
        file.language = Some(ctx.language(lang, "asset", asset.id).to_string());
    }
    if let Some(secure) = asset.secure {
        file.secure = map_secure(secure);
    }
    file.published = file.secure == SEC_PUBLIC;

    let base = ctx.server_url(asset.server.as_deref()).unwrap_or_default();
    Patch::new(asset.id)
        .set("url", format!("{base}/{}", file.name))
        .set_opt("duration", asset.duration_secs)
        .apply(&mut file.properties);

    if let Some(prev) = file.content_unit_id.filter(|&id| id != unit.id) {
        warn!(
            file_id = file.id,
            from = prev,
            to = unit.id,
            "changing file's unit association"
        );
    }
    file.content_unit_id = Some(unit.id);

    tx.update_file(&file)
        .await
        .with_context(|| format!("Update file [{}]", file.id))?;
    tx.link_file_operation(file.id, operation.id)
        .await
        .with_context(|| format!("Link file [{}] to operation [{}]", file.id, operation.id))?;

    Ok(Some(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surrogate_is_sha1_of_decimal_id() {
        assert_eq!(surrogate_hash(1), "356a192b7913b04c54574d18c28d46e6395428ab");
        assert_eq!(surrogate_hash(1).len(), 40);
        assert_ne!(surrogate_hash(1), surrogate_hash(2));
    }

    #[test]
    fn blank_hash_counts_as_missing() {
        let mut asset = LeafAsset {
            id: 1,
            name: "a.mp3".into(),
            sha1: Some("  ".into()),
            size: 0,
            extension: None,
            lang: None,
            secure: None,
            duration_secs: None,
            server: None,
            created_at: None,
        };
        assert_eq!(real_hash(&asset), None);
        asset.sha1 = Some(" abc ".into());
        assert_eq!(real_hash(&asset), Some("abc"));
    }
}
