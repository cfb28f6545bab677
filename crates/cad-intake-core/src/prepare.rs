use crate::error::PrepareError;
use crate::model::{CadFile, IncomingFile, InternalFileRecord, Level, ParentLink, PreparedCad};
use crate::storage::MetadataStore;
use crate::tables;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Read-only inputs shared by every preparation in a batch.
pub struct PrepareContext<'a> {
    pub store: &'a dyn MetadataStore,
    pub project: u32,
    pub merge_root: &'a Path,
    pub scripts_dir: &'a Path,
}

/// Split `EL[LITE]` into (`EL`, Some(`LITE`)). A blank bracket means no sub-trade.
pub fn split_trade(field: &str) -> (String, Option<String>) {
    match field.split_once('[') {
        Some((primary, rest)) if rest.contains(']') => {
            let sub = rest.split(']').next().unwrap_or_default().trim();
            let sub = if sub.is_empty() {
                None
            } else {
                Some(sub.to_string())
            };
            (primary.to_string(), sub)
        }
        _ => (field.to_string(), None),
    }
}

/// Comma-separated script names resolved against the shared script directory.
pub fn resolve_extra_scripts(scripts: Option<&str>, scripts_dir: &Path) -> Result<Vec<PathBuf>, PrepareError> {
    let names = match scripts {
        Some(names) => names,
        None => return Ok(Vec::new()),
    };

    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            let path = scripts_dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(PrepareError::ScriptNotFound(path))
            }
        })
        .collect()
}

/// Resolve trade, level, elevation and output paths for one incoming CAD file.
pub fn prepare(ctx: &PrepareContext<'_>, incoming: &IncomingFile) -> Result<PreparedCad, PrepareError> {
    let record = file_record(ctx, incoming)?;
    prepare_record(ctx, incoming, record)
}

fn file_record(ctx: &PrepareContext<'_>, incoming: &IncomingFile) -> Result<InternalFileRecord, PrepareError> {
    ctx.store
        .internal_record(ctx.project, &incoming.base_name())?
        .ok_or_else(|| PrepareError::NoFileRecord(incoming.name.clone()))
}

fn prepare_record(
    ctx: &PrepareContext<'_>,
    incoming: &IncomingFile,
    record: InternalFileRecord,
) -> Result<PreparedCad, PrepareError> {
    let (primary, sub_trade) = split_trade(&record.trade_abbreviation);

    let extra_scripts = resolve_extra_scripts(record.scripts.as_deref(), ctx.scripts_dir)?;

    let trade = ctx
        .store
        .trade(ctx.project, &primary)?
        .ok_or_else(|| PrepareError::TradeNotFound {
            abbreviation: primary.clone(),
            project: ctx.project,
        })?
        .resolve()?;

    let processed_dir = ctx.merge_root.join(&trade.full_name);
    fs::create_dir_all(&processed_dir)?;
    let processed_path = processed_dir.join(format!("{}.dwg", record.internal_name));

    let parent = record.parent_name.as_ref().map(|parent_name| ParentLink {
        base_name: parent_name.clone(),
        processed_path: processed_dir.join(format!("{}.dwg", parent_name)),
    });

    // structural drawings sit one level below the level they are named for
    let by_level_above = tables::is_structural(&trade.abbreviation);
    let column = trade.elevation_source.column();
    let elevation = ctx
        .store
        .elevation(ctx.project, &record.level, by_level_above, column)?
        .ok_or_else(|| PrepareError::ElevationNotFound(record.internal_name.clone()))?;

    debug!(
        "{}: trade {} level {} elevation {}",
        incoming.name, trade.abbreviation, record.level, elevation
    );

    Ok(PreparedCad {
        level: Level {
            name: record.level.clone(),
            elevation,
            from_model: trade.elevation_source == crate::model::ElevationSource::Model,
        },
        trade,
        sub_trade,
        processed_base_name: record.internal_name,
        processed_path,
        parent,
        extra_scripts,
        last_processed: record.last_processed,
    })
}

/// Prepare in place; a failure is logged and leaves the file unprepared.
pub fn prepare_file(ctx: &PrepareContext<'_>, file: &mut CadFile) {
    info!("Preparing {} for processing.", file.incoming.name);

    // the declared parent outlives a failed preparation so the parent barrier sees it
    let result = match file_record(ctx, &file.incoming) {
        Ok(record) => {
            file.declared_parent = record.parent_name.clone();
            prepare_record(ctx, &file.incoming, record)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(prepared) => file.prepared = Some(prepared),
        Err(e) => {
            error!("{}: {}", file.incoming.name, e);
            file.prepared = None;
        }
    }
}
