//! Hierarchical mapper: legacy session -> group, legacy node -> unit, plus
//! the unit's localized text, group membership and taxonomy links.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::context::MigrationContext;
use super::props::Patch;
use super::registry::{lecturer_pattern, map_secure, FALLBACK_NAME_LANGS, LECTURER_ROLE_ID};
use crate::store::{
    ContentType, GroupColumn, Membership, SourceNode, SourceSession, SourceStore, TargetGroup,
    TargetStore, TargetTx, TargetUnit, UnitColumn, UnitI18n,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Saturday sessions get their own group type; every other day, and an
/// unknown date, is a daily session.
pub fn group_content_type(film_date: Option<NaiveDate>) -> ContentType {
    match film_date.map(|d| d.weekday()) {
        Some(Weekday::Sat) => ContentType::SaturdayLesson,
        _ => ContentType::DailyLesson,
    }
}

pub async fn map_group<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    session: &SourceSession,
) -> Result<TargetGroup> {
    let mut group = match tx
        .find_group(session.id)
        .await
        .with_context(|| format!("Lookup group, legacy session [{}]", session.id))?
    {
        Some(g) => {
            ctx.stats.groups.updated.inc();
            g
        }
        None => {
            let g = tx
                .insert_group(ContentType::DailyLesson)
                .await
                .with_context(|| format!("Insert group, legacy session [{}]", session.id))?;
            ctx.stats.groups.created.inc();
            g
        }
    };

    group.content_type = group_content_type(session.film_date);
    Patch::new(session.id)
        .set_opt(
            "film_date",
            session.film_date.map(|d| d.format(DATE_FORMAT).to_string()),
        )
        .apply(&mut group.properties);

    tx.update_group(&group, &[GroupColumn::ContentType, GroupColumn::Properties])
        .await
        .with_context(|| format!("Update group [{}]", group.id))?;
    Ok(group)
}

pub async fn map_unit<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    node: &SourceNode,
    group: &TargetGroup,
) -> Result<TargetUnit> {
    let mut unit = match tx
        .find_unit(node.id)
        .await
        .with_context(|| format!("Lookup unit, legacy node [{}]", node.id))?
    {
        Some(u) => {
            ctx.stats.units.updated.inc();
            // Retyping in the target is kept.
            if u.content_type != ContentType::LessonPart {
                warn!(
                    unit_id = u.id,
                    node_id = node.id,
                    stored = %u.content_type,
                    "different unit type"
                );
            }
            u
        }
        None => {
            let u = tx
                .insert_unit(ContentType::LessonPart)
                .await
                .with_context(|| format!("Insert unit, legacy node [{}]", node.id))?;
            ctx.stats.units.created.inc();
            u
        }
    };

    unit.secure = map_secure(node.secure);
    let original_language = node
        .lang
        .as_deref()
        .map(|raw| ctx.language(raw, "node", node.id));
    Patch::new(node.id)
        .set("secure", node.secure)
        .set_opt("original_language", original_language)
        .set_opt(
            "film_date",
            node.film_date.map(|d| d.format(DATE_FORMAT).to_string()),
        )
        .set_opt("duration", node.duration_secs)
        .apply(&mut unit.properties);

    tx.update_unit(&unit, &[UnitColumn::Secure, UnitColumn::Properties])
        .await
        .with_context(|| format!("Update properties, unit [{}]", unit.id))?;

    map_unit_i18n(ctx, tx, node, &unit).await?;
    attach_membership(tx, node, group, &unit).await?;
    link_taxonomy(ctx, tx, node, &unit).await?;
    link_lecturer(ctx, tx, node, &unit).await?;

    Ok(unit)
}

async fn map_unit_i18n<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    node: &SourceNode,
    unit: &TargetUnit,
) -> Result<()> {
    let descriptions = ctx
        .source
        .node_descriptions(node.id)
        .await
        .with_context(|| format!("Lookup node descriptions, legacy node [{}]", node.id))?;

    let non_empty = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.is_empty());
    let mut written = 0usize;
    for d in descriptions
        .iter()
        .filter(|d| non_empty(&d.name) || non_empty(&d.description))
    {
        tx.upsert_unit_i18n(&UnitI18n {
            unit_id: unit.id,
            language: ctx.language(&d.lang, "node description", node.id).to_string(),
            name: d.name.clone(),
            description: d.description.clone(),
        })
        .await
        .with_context(|| format!("Upsert unit i18n, unit [{}]", unit.id))?;
        written += 1;
    }

    if written == 0 && non_empty(&node.name) {
        for lang in FALLBACK_NAME_LANGS {
            tx.upsert_unit_i18n(&UnitI18n {
                unit_id: unit.id,
                language: lang.to_string(),
                name: node.name.clone(),
                description: None,
            })
            .await
            .with_context(|| format!("Upsert unit i18n, unit [{}]", unit.id))?;
        }
    }
    Ok(())
}

/// Membership name is the node position rendered as text; existing rows are
/// patched in place.
async fn attach_membership<Tx: TargetTx>(
    tx: &mut Tx,
    node: &SourceNode,
    group: &TargetGroup,
    unit: &TargetUnit,
) -> Result<()> {
    let wanted = Membership {
        group_id: group.id,
        unit_id: unit.id,
        name: node.position.to_string(),
        position: node.position,
    };
    match tx.find_membership(group.id, unit.id).await? {
        None => tx
            .insert_membership(&wanted)
            .await
            .with_context(|| format!("Add unit collections, unit [{}]", unit.id))?,
        Some(existing) if existing != wanted => tx
            .update_membership(&wanted)
            .await
            .with_context(|| {
                format!(
                    "Update unit collection association, unit [{}], collection [{}]",
                    unit.id, group.id
                )
            })?,
        Some(_) => {}
    }
    Ok(())
}

async fn link_taxonomy<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    node: &SourceNode,
    unit: &TargetUnit,
) -> Result<()> {
    let catalogs = ctx
        .source
        .node_catalogs(node.id)
        .await
        .with_context(|| format!("Load catalogs, legacy node [{}]", node.id))?;
    let links = ctx.mappings.resolve_all(&catalogs);
    for c in &links.unmapped {
        debug!(node_id = node.id, catalog_id = c.id, "unmapped catalog");
        ctx.stats.record_unmapped(c.id, &c.name);
    }

    // Links added by hand in the target survive re-runs.
    let mut sources: BTreeSet<i64> = tx
        .unit_sources(unit.id)
        .await
        .with_context(|| format!("Load unit sources [{}]", unit.id))?
        .into_iter()
        .collect();
    sources.extend(links.sources);
    let mut tags: BTreeSet<i64> = tx
        .unit_tags(unit.id)
        .await
        .with_context(|| format!("Load unit tags [{}]", unit.id))?
        .into_iter()
        .collect();
    tags.extend(links.tags);

    let sources: Vec<i64> = sources.into_iter().collect();
    let tags: Vec<i64> = tags.into_iter().collect();
    tx.set_unit_sources(unit.id, &sources)
        .await
        .with_context(|| format!("Set sources, unit [{}]", unit.id))?;
    tx.set_unit_tags(unit.id, &tags)
        .await
        .with_context(|| format!("Set tags, unit [{}]", unit.id))?;
    Ok(())
}

/// Known lecturers are attached to the unit; linking twice is a no-op.
async fn link_lecturer<S: SourceStore, T: TargetStore>(
    ctx: &MigrationContext<S, T>,
    tx: &mut T::Tx,
    node: &SourceNode,
    unit: &TargetUnit,
) -> Result<()> {
    let Some(person_id) = node
        .lecturer_id
        .and_then(lecturer_pattern)
        .and_then(|pattern| ctx.persons.get(pattern).copied())
    else {
        return Ok(());
    };
    tx.add_unit_person(unit.id, person_id, LECTURER_ROLE_ID)
        .await
        .with_context(|| format!("Add person, unit [{}]", unit.id))
}

/// Marks a unit published. Never unpublishes.
pub async fn publish_unit<Tx: TargetTx>(tx: &mut Tx, unit: &mut TargetUnit) -> Result<()> {
    if unit.published {
        return Ok(());
    }
    unit.published = true;
    tx.update_unit(unit, &[UnitColumn::Published])
        .await
        .with_context(|| format!("Publish unit [{}]", unit.id))
}

/// Marks a group published. Never unpublishes.
pub async fn publish_group<Tx: TargetTx>(tx: &mut Tx, group: &mut TargetGroup) -> Result<()> {
    if group.published {
        return Ok(());
    }
    group.published = true;
    tx.update_group(group, &[GroupColumn::Published])
        .await
        .with_context(|| format!("Publish group [{}]", group.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturday_rule() {
        let sat = NaiveDate::from_ymd_opt(2017, 1, 7).unwrap();
        let sun = NaiveDate::from_ymd_opt(2017, 1, 8).unwrap();
        let fri = NaiveDate::from_ymd_opt(2017, 1, 6).unwrap();
        assert_eq!(group_content_type(Some(sat)), ContentType::SaturdayLesson);
        assert_eq!(group_content_type(Some(sun)), ContentType::DailyLesson);
        assert_eq!(group_content_type(Some(fri)), ContentType::DailyLesson);
        assert_eq!(group_content_type(None), ContentType::DailyLesson);
    }
}
