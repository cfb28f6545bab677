//! Recombining per-area child drawings into their parent.
//!
//! Runs only after every child pipeline in the batch has finished. A parent
//! is combined only when all of its children that ran in this batch succeeded.

use crate::cad::{CadEngine, ScriptTemplates};
use crate::error::{CombineError, ExecutionError};
use crate::freshness::verify_fresh;
use crate::model::{CadFile, ChildState, ParentFile};
use crate::storage::MetadataStore;
use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, info};

pub struct CombineContext<'a> {
    pub engine: &'a dyn CadEngine,
    pub templates: &'a ScriptTemplates,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One parent per distinct parent path among successfully executed children.
pub fn plan_parents(store: &dyn MetadataStore, project: u32, files: &[CadFile]) -> Vec<ParentFile> {
    let mut seen = HashSet::new();
    let mut parents = Vec::new();

    for file in files.iter().filter(|f| f.execute_successful()) {
        let (prepared, inbox, link) = match (&file.prepared, &file.inbox, file.parent()) {
            (Some(prepared), Some(inbox), Some(link)) => (prepared, inbox, link),
            _ => continue,
        };
        if !seen.insert(link.processed_path.clone()) {
            continue;
        }
        let template_path = match &file.outcome.template_path {
            Some(path) => path.clone(),
            None => continue,
        };

        let processed_dir = link
            .processed_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let child_paths = match store.child_internal_names(project, &link.base_name) {
            Ok(names) => names
                .iter()
                .map(|name| processed_dir.join(format!("{}.dwg", name)))
                .collect(),
            Err(e) => {
                error!("Could not read children of {}: {}", link.base_name, e);
                Vec::new()
            }
        };

        // unprepared children count too; they can never have executed
        let children = files
            .iter()
            .filter(|f| f.declares_parent(&link.base_name))
            .map(|f| ChildState {
                base_name: f
                    .prepared
                    .as_ref()
                    .map(|p| p.processed_base_name.clone())
                    .unwrap_or_else(|| f.incoming.base_name()),
                execute_successful: f.execute_successful(),
            })
            .collect();

        parents.push(ParentFile {
            base_name: link.base_name.clone(),
            processed_path: link.processed_path.clone(),
            inbox_directory: inbox.directory.clone(),
            inbox_save_as_path: inbox.directory.join(format!("{}.dwg", link.base_name)),
            trade: prepared.trade.clone(),
            level: prepared.level.clone(),
            template_path,
            child_paths,
            children,
            execute_successful: false,
        });
    }
    parents
}

pub fn combine(ctx: &CombineContext<'_>, parent: &ParentFile) -> Result<PathBuf, CombineError> {
    if parent.child_paths.is_empty() {
        return Err(CombineError::NoChildren(parent.base_name.clone()));
    }
    if parent.children.iter().any(|c| !c.execute_successful) {
        return Err(CombineError::ChildFailed(parent.processed_path.display().to_string()));
    }

    // expected children may be absent on disk; they are left out
    let present: Vec<PathBuf> = parent
        .child_paths
        .iter()
        .filter(|p| p.exists())
        .cloned()
        .collect();

    let script = ctx
        .templates
        .render_combine(&present, &parent.inbox_save_as_path)?;
    let scripts_dir = parent.inbox_directory.join("Backup").join("Scripts");
    fs::create_dir_all(&scripts_dir)?;
    let script_path = scripts_dir.join(format!(
        "{}_{}_combine.scr",
        parent.trade.abbreviation, parent.level.name
    ));
    fs::write(&script_path, script)?;

    if parent.inbox_save_as_path.exists() {
        fs::remove_file(&parent.inbox_save_as_path)?;
    }

    info!(
        "Combining files {} into: {}",
        present.iter().map(|p| file_name(p)).collect::<Vec<_>>().join(", "),
        file_name(&parent.processed_path)
    );

    let started = SystemTime::now();
    ctx.engine.run(&parent.template_path, &script_path)?;

    if !verify_fresh(&parent.inbox_save_as_path, started) {
        return Err(CombineError::NotCreated(parent.base_name.clone()));
    }

    fs::copy(&parent.inbox_save_as_path, &parent.processed_path)?;
    if !verify_fresh(&parent.processed_path, started) {
        return Err(CombineError::DeliveryFailed(parent.base_name.clone()));
    }
    Ok(parent.processed_path.clone())
}

/// Combine in place. Failures are logged and leave the parent unsuccessful.
pub fn combine_parent(ctx: &CombineContext<'_>, parent: &mut ParentFile) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| combine(ctx, parent))).unwrap_or_else(|_| {
        Err(CombineError::Execution(ExecutionError::Panicked(parent.base_name.clone())))
    });

    parent.execute_successful = match result {
        Ok(path) => {
            info!("Combined {}", path.display());
            true
        }
        Err(e) => {
            error!("{}", e);
            false
        }
    };
}
