//! Per-file script pipeline.
//!
//! Each stage takes the artifact produced by the previous stage and returns the
//! next one, so the file's current location is never shared mutable state:
//!
//! `Prepared -> CopiedToInbox -> RefTagBuilt -> Cleaned -> Inserted -> Delivered`
//!
//! The first failing stage ends the pipeline for that file. Errors are caught
//! once in [`execute`] and turned into an unsuccessful outcome.

use crate::backup::{BackupArchiver, ARCHIVE_NAME};
use crate::cad::scripts::default_reftag_label;
use crate::cad::{CadEngine, ScriptTemplates};
use crate::error::ExecutionError;
use crate::freshness::verify_fresh;
use crate::model::{CadFile, ExecutionOutcome, InboxAssignment, IncomingFile, PreparedCad};
use crate::tables::{self, RefTagType};
use chrono::{Local, Timelike};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepared,
    CopiedToInbox,
    RefTagBuilt,
    Cleaned,
    Inserted,
    Delivered,
}

/// Where the file currently lives, and which stage put it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub stage: Stage,
    pub path: PathBuf,
}

impl Artifact {
    fn advance(stage: Stage, path: impl Into<PathBuf>) -> Self {
        Artifact {
            stage,
            path: path.into(),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Shared, read-only collaborators handed to every worker.
pub struct PipelineContext<'a> {
    pub engine: &'a dyn CadEngine,
    pub templates: &'a ScriptTemplates,
    pub archiver: &'a BackupArchiver,
}

fn write_script(path: &Path, text: &str) -> Result<(), ExecutionError> {
    fs::write(path, text)?;
    debug!("Wrote script {}", path.display());
    Ok(())
}

/// Copy the download into its inbox folder, creating the batch layout.
pub fn copy_to_inbox(source: &IncomingFile, inbox: &InboxAssignment) -> Result<Artifact, ExecutionError> {
    fs::create_dir_all(inbox.scripts_dir())?;
    fs::create_dir_all(inbox.reftags_dir())?;

    let destination = inbox.directory.join(&source.name);
    fs::copy(&source.path, &destination)?;
    Ok(Artifact::advance(Stage::CopiedToInbox, destination))
}

/// Add the inbox copy to the batch archive. Failure is reported, never fatal.
pub fn archive(archiver: &BackupArchiver, inbox: &InboxAssignment, current: &Artifact) {
    let archive_path = inbox.backup_dir().join(ARCHIVE_NAME);
    if let Err(e) = archiver.append(&archive_path, &current.path) {
        error!("{}", e);
    }
}

/// Build the reference tag drawing. Returns the tag, which is also the insert template.
pub fn build_reftag(
    ctx: &PipelineContext<'_>,
    file: &PreparedCad,
    inbox: &InboxAssignment,
) -> Result<Artifact, ExecutionError> {
    let stem = file.tag_stem();
    let script_path = inbox.scripts_dir().join(format!("{}_createRefTag.scr", stem));
    let reftag_path = inbox.reftags_dir().join(format!("{}_reftag.dwg", stem));

    let (kind, label) = match tables::reftag_type(&file.trade.abbreviation) {
        Some(kind) => (kind, kind.label().to_string()),
        None => {
            warn!(
                "Reftag template not found for {}, falling back to default reftag.",
                reftag_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            );
            (RefTagType::Default, default_reftag_label(&reftag_path))
        }
    };

    let template = ctx.templates.reftag_template(kind);
    if !template.is_file() {
        return Err(ExecutionError::ReftagTemplateMissing(template));
    }

    let script = ctx
        .templates
        .render_reftag(&label, &file.level.name, &reftag_path)?;
    write_script(&script_path, &script)?;

    ctx.engine.run(&template, &script_path)?;

    if reftag_path.exists() {
        Ok(Artifact::advance(Stage::RefTagBuilt, reftag_path))
    } else {
        Err(ExecutionError::ReftagNotCreated(reftag_path))
    }
}

/// `plan.dwg` exports to `plan-ACAD.dwg` beside it.
pub fn export_path(drawing: &Path) -> PathBuf {
    let stem = drawing
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    drawing.with_file_name(format!("{}-ACAD.dwg", stem))
}

/// Run the clean script on the inbox copy. With export enabled the exported
/// drawing becomes the current artifact.
pub fn clean(
    ctx: &PipelineContext<'_>,
    file: &PreparedCad,
    inbox: &InboxAssignment,
    current: Artifact,
) -> Result<Artifact, ExecutionError> {
    let block_suffix = Local::now().nanosecond() / 1_000_000;
    let script = ctx.templates.render_clean(file, block_suffix)?;

    let export = if file.trade.export_cross_section {
        let export = export_path(&current.path);
        if export.exists() {
            debug!("Removing stale export {}", export.display());
            fs::remove_file(&export)?;
        }
        Some(export)
    } else {
        None
    };

    let script_path = inbox
        .scripts_dir()
        .join(format!("{}_clean.scr", file.tag_stem()));
    write_script(&script_path, &script)?;

    ctx.engine.run(&current.path, &script_path)?;

    match export {
        Some(export) if export.exists() => Ok(Artifact::advance(Stage::Cleaned, export)),
        Some(export) => Err(ExecutionError::ExportMissing(export)),
        None => Ok(Artifact::advance(Stage::Cleaned, current.path)),
    }
}

/// Insert the cleaned drawing into the tag and save it to the inbox save-as path.
/// Returns the new artifact and the timestamp taken before the engine ran.
pub fn insert(
    ctx: &PipelineContext<'_>,
    file: &PreparedCad,
    inbox: &InboxAssignment,
    template: &Path,
    current: Artifact,
) -> Result<(Artifact, SystemTime), ExecutionError> {
    let script = ctx.templates.render_insert(
        &file.trade.abbreviation,
        &current.path,
        &inbox.save_as_path,
    )?;
    let script_path = inbox
        .scripts_dir()
        .join(format!("{}_insert.scr", file.tag_stem()));
    write_script(&script_path, &script)?;

    if inbox.save_as_path.exists() {
        fs::remove_file(&inbox.save_as_path)?;
    }

    info!(
        "Inserting {} into {} and saving to {}.",
        current.file_name(),
        template
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        inbox
            .save_as_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );

    let started = SystemTime::now();
    ctx.engine.run(template, &script_path)?;

    if verify_fresh(&inbox.save_as_path, started) {
        Ok((Artifact::advance(Stage::Inserted, &inbox.save_as_path), started))
    } else {
        Err(ExecutionError::InsertFailed(current.file_name()))
    }
}

/// Copy into the merge directory and apply the same freshness rule.
pub fn deliver(current: Artifact, destination: &Path, started: SystemTime) -> Result<Artifact, ExecutionError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(&current.path, destination)?;

    if verify_fresh(destination, started) {
        Ok(Artifact::advance(Stage::Delivered, destination))
    } else {
        Err(ExecutionError::DeliveryFailed(current.file_name()))
    }
}

/// Extra per-file scripts. Failures are logged only.
pub fn run_extra_scripts(engine: &dyn CadEngine, file: &PreparedCad, merged: &Path) {
    for script in &file.extra_scripts {
        info!("Running {} on {}", script.display(), merged.display());
        if let Err(e) = engine.run(merged, script) {
            error!("{}: {}", merged.display(), e);
        }
    }
}

fn run_stages(
    ctx: &PipelineContext<'_>,
    source: &IncomingFile,
    file: &PreparedCad,
    inbox: &InboxAssignment,
) -> Result<ExecutionOutcome, ExecutionError> {
    let current = copy_to_inbox(source, inbox)?;
    archive(ctx.archiver, inbox, &current);

    let template = build_reftag(ctx, file, inbox)?;
    let current = clean(ctx, file, inbox, current)?;
    let (current, started) = insert(ctx, file, inbox, &template.path, current)?;
    let merged = deliver(current, &file.processed_path, started)?;

    run_extra_scripts(ctx.engine, file, &merged.path);

    Ok(ExecutionOutcome {
        template_path: Some(template.path),
        merged_path: Some(merged.path),
    })
}

/// Run the whole pipeline for one file. Never panics or returns an error;
/// the outcome records whether the file reached the merge directory.
pub fn execute(ctx: &PipelineContext<'_>, file: &mut CadFile) {
    let name = file.incoming.name.clone();

    let (prepared, inbox) = match (&file.prepared, &file.inbox) {
        (Some(prepared), Some(inbox)) => (prepared, inbox),
        _ => {
            warn!("{} was not prepared, skipping", name);
            file.outcome = ExecutionOutcome::default();
            return;
        }
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        run_stages(ctx, &file.incoming, prepared, inbox)
    }))
    .unwrap_or_else(|_| Err(ExecutionError::Panicked(name.clone())));

    file.outcome = match result {
        Ok(outcome) => {
            info!("{} processed", name);
            outcome
        }
        Err(e) => {
            error!("{}: {}", name, e);
            ExecutionOutcome::default()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElevationSource, Level, Trade, TradeColor};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Writes `-ACAD` exports when asked, otherwise touches nothing.
    struct ExportingEngine {
        export: bool,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl CadEngine for ExportingEngine {
        fn run(&self, drawing: &Path, _script: &Path) -> Result<(), ExecutionError> {
            self.calls.lock().unwrap().push(drawing.to_path_buf());
            if self.export {
                fs::write(export_path(drawing), "exported").unwrap();
            }
            Ok(())
        }
    }

    struct PanickingEngine;

    impl CadEngine for PanickingEngine {
        fn run(&self, _drawing: &Path, _script: &Path) -> Result<(), ExecutionError> {
            panic!("engine blew up");
        }
    }

    fn prepared(root: &Path, export: bool) -> PreparedCad {
        PreparedCad {
            trade: Trade {
                abbreviation: "HP".to_string(),
                full_name: "Heating Piping".to_string(),
                subdirectory: String::new(),
                color: TradeColor::NoChange,
                export_cross_section: export,
                elevation_source: ElevationSource::Coordinated,
                owned: false,
            },
            level: Level {
                name: "01".to_string(),
                elevation: "0'0".to_string(),
                from_model: false,
            },
            sub_trade: None,
            processed_base_name: "123456_HP-Lev01".to_string(),
            processed_path: root.join("merge/Heating Piping/123456_HP-Lev01.dwg"),
            parent: None,
            extra_scripts: vec![],
            last_processed: None,
        }
    }

    fn inbox(root: &Path) -> InboxAssignment {
        let directory = root.join("inbox/HP/2024-03-01(0930)_HP-01");
        InboxAssignment {
            subdirectory: PathBuf::from("HP/2024-03-01(0930)_HP-01"),
            save_as_path: directory.join("123456_HP-Lev01.dwg"),
            directory,
        }
    }

    fn templates(root: &Path) -> ScriptTemplates {
        let scripts = root.join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join(crate::cad::scripts::CLEAN_TEMPLATE), "%CHANGECOLOR%\n;-exporttoautocad\n").unwrap();
        ScriptTemplates::new(scripts, root.join("reftags"))
    }

    #[test]
    fn test_copy_to_inbox_builds_layout() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("download.dwg");
        fs::write(&source, "dwg").unwrap();
        let incoming = IncomingFile::from_path(&source).unwrap();
        let plan = inbox(tmp.path());

        let artifact = copy_to_inbox(&incoming, &plan).unwrap();
        assert_eq!(artifact.stage, Stage::CopiedToInbox);
        assert_eq!(artifact.path, plan.directory.join("download.dwg"));
        assert!(plan.scripts_dir().is_dir());
        assert!(plan.reftags_dir().is_dir());
    }

    #[test]
    fn test_clean_with_export_switches_handle() {
        let tmp = tempdir().unwrap();
        let plan = inbox(tmp.path());
        fs::create_dir_all(plan.scripts_dir()).unwrap();
        let drawing = plan.directory.join("download.dwg");
        fs::write(&drawing, "dwg").unwrap();
        fs::write(export_path(&drawing), "stale").unwrap();

        let engine = ExportingEngine {
            export: true,
            calls: Mutex::new(vec![]),
        };
        let templates = templates(tmp.path());
        let archiver = BackupArchiver::new();
        let ctx = PipelineContext {
            engine: &engine,
            templates: &templates,
            archiver: &archiver,
        };

        let current = Artifact::advance(Stage::CopiedToInbox, &drawing);
        let cleaned = clean(&ctx, &prepared(tmp.path(), true), &plan, current).unwrap();
        assert_eq!(cleaned.stage, Stage::Cleaned);
        assert_eq!(cleaned.path, plan.directory.join("download-ACAD.dwg"));
        assert_eq!(fs::read_to_string(&cleaned.path).unwrap(), "exported");
        assert_eq!(engine.calls.lock().unwrap().as_slice(), &[drawing]);
    }

    #[test]
    fn test_clean_missing_export_is_fatal() {
        let tmp = tempdir().unwrap();
        let plan = inbox(tmp.path());
        fs::create_dir_all(plan.scripts_dir()).unwrap();
        let drawing = plan.directory.join("download.dwg");
        fs::write(&drawing, "dwg").unwrap();
        fs::write(export_path(&drawing), "stale").unwrap();

        let engine = ExportingEngine {
            export: false,
            calls: Mutex::new(vec![]),
        };
        let templates = templates(tmp.path());
        let archiver = BackupArchiver::new();
        let ctx = PipelineContext {
            engine: &engine,
            templates: &templates,
            archiver: &archiver,
        };

        let current = Artifact::advance(Stage::CopiedToInbox, &drawing);
        let result = clean(&ctx, &prepared(tmp.path(), true), &plan, current);
        assert!(matches!(result, Err(ExecutionError::ExportMissing(_))));
    }

    #[test]
    fn test_missing_reftag_template_fails_explicitly() {
        let tmp = tempdir().unwrap();
        let plan = inbox(tmp.path());
        fs::create_dir_all(plan.scripts_dir()).unwrap();
        let engine = ExportingEngine {
            export: false,
            calls: Mutex::new(vec![]),
        };
        let templates = templates(tmp.path());
        let archiver = BackupArchiver::new();
        let ctx = PipelineContext {
            engine: &engine,
            templates: &templates,
            archiver: &archiver,
        };

        let result = build_reftag(&ctx, &prepared(tmp.path(), false), &plan);
        assert!(matches!(result, Err(ExecutionError::ReftagTemplateMissing(p)) if p.ends_with("Reftag_HP.dwg")));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_engine_becomes_failure() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("download.dwg");
        fs::write(&source, "dwg").unwrap();

        let reftags = tmp.path().join("reftags");
        fs::create_dir_all(&reftags).unwrap();
        fs::write(reftags.join("Reftag_HP.dwg"), "tag").unwrap();
        fs::write(reftags.join(crate::cad::scripts::REFTAG_TEXT_TEMPLATE), "%FILEPATH%").unwrap();

        let mut file = CadFile::new(
            IncomingFile::from_path(&source).unwrap(),
            crate::model::TaskType::ProcessCad,
        );
        file.prepared = Some(prepared(tmp.path(), false));
        file.inbox = Some(inbox(tmp.path()));

        let templates = templates(tmp.path());
        let archiver = BackupArchiver::new();
        let ctx = PipelineContext {
            engine: &PanickingEngine,
            templates: &templates,
            archiver: &archiver,
        };

        execute(&ctx, &mut file);
        assert!(!file.execute_successful());
    }

    #[test]
    fn test_export_path() {
        assert_eq!(
            export_path(Path::new("/inbox/plan.dwg")),
            PathBuf::from("/inbox/plan-ACAD.dwg")
        );
    }
}
