#![allow(dead_code)]

use cad_intake_core::cad::scripts::{CLEAN_TEMPLATE, COMBINE_TEMPLATE, INSERT_TEMPLATE, REFTAG_TEXT_TEMPLATE};
use cad_intake_core::error::ExecutionError;
use cad_intake_core::model::TradeRow;
use cad_intake_core::pipeline::export_path;
use cad_intake_core::storage::models::{ElevationRow, FileRow, ProjectRecord};
use cad_intake_core::{AppConfig, CadEngine, Database, MetadataStore, UpdateEngine};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

pub const PROJECT: u32 = 123456;

/// Stands in for the CAD console: reads the generated script and writes the
/// files a real engine would. `SAVEAS <path>` writes `<path>`, an export block
/// writes the `-ACAD` sibling, `qsave` rewrites the drawing.
pub struct ScriptedEngine {
    pub calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail_when: Option<String>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_when: None,
        }
    }

    /// Runs whose drawing, script path or script text mentions `needle`
    /// leave the disk untouched.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_when: Some(needle.to_string()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn ran_on(&self, drawing: &Path) -> bool {
        self.calls.lock().unwrap().iter().any(|(d, _)| d == drawing)
    }
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"')
}

impl CadEngine for ScriptedEngine {
    fn run(&self, drawing: &Path, script: &Path) -> Result<(), ExecutionError> {
        self.calls
            .lock()
            .unwrap()
            .push((drawing.to_path_buf(), script.to_path_buf()));

        let text = fs::read_to_string(script)?;
        if let Some(needle) = &self.fail_when {
            let mentioned = text.contains(needle.as_str())
                || script.to_string_lossy().contains(needle.as_str())
                || drawing.to_string_lossy().contains(needle.as_str());
            if mentioned {
                return Ok(());
            }
        }

        // outputs must be strictly newer than the caller's pre-run timestamp
        thread::sleep(Duration::from_millis(25));

        for line in text.lines().map(str::trim) {
            if line.starts_with(';') {
                continue;
            }
            if let Some(target) = line.strip_prefix("SAVEAS ") {
                fs::write(unquote(target), format!("saved from {}", drawing.display()))?;
            } else if line.contains("-exporttoautocad") {
                fs::write(export_path(drawing), "exported")?;
            } else if line == "qsave" {
                let contents = fs::read(drawing)?;
                fs::write(drawing, contents)?;
            }
        }
        Ok(())
    }
}

/// Runs nothing and writes nothing.
pub struct NoopEngine;

impl CadEngine for NoopEngine {
    fn run(&self, _drawing: &Path, _script: &Path) -> Result<(), ExecutionError> {
        Ok(())
    }
}

pub fn write_templates(scripts_dir: &Path, reftag_dir: &Path) {
    fs::create_dir_all(scripts_dir).unwrap();
    fs::create_dir_all(reftag_dir).unwrap();

    fs::write(
        scripts_dir.join(CLEAN_TEMPLATE),
        "%CHANGECOLOR%audit\n;%ARCH_SCRIPT%\n;block\n;elevate\n;-exporttoautocad\n",
    )
    .unwrap();
    fs::write(
        scripts_dir.join(INSERT_TEMPLATE),
        "-insert %insertblock% %FILENAME%\nSAVEAS %REVIEWFILEPATH%\n",
    )
    .unwrap();
    fs::write(
        scripts_dir.join(COMBINE_TEMPLATE),
        "%LAYERSANDINSERTS%\nSAVEAS %COMBINEDFILEPATH%\n",
    )
    .unwrap();
    fs::write(scripts_dir.join("AR_CHANGE_COLORS.scr"), "-layer color 8 *\n").unwrap();

    fs::write(
        reftag_dir.join(REFTAG_TEXT_TEMPLATE),
        "-text %TRADEABBREV% %LEVEL%\nSAVEAS %FILEPATH%\n",
    )
    .unwrap();
    for tag in ["Reftag_Default.dwg", "Reftag_HP.dwg", "Reftag_AR.dwg", "Reftag_EL.dwg"] {
        fs::write(reftag_dir.join(tag), "reftag template").unwrap();
    }
}

/// A project tree, a seeded in-memory store and script templates under one tempdir.
pub struct Fixture {
    pub tmp: TempDir,
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub download: PathBuf,
    pub inbox: PathBuf,
    pub merge: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        let projects_dir = root.join("projects");
        let inbox = projects_dir
            .join("123456 - Tower")
            .join("01 Field Management")
            .join("04 Coordination")
            .join("INbox");
        fs::create_dir_all(&inbox).unwrap();

        let download_root = root.join("downloads");
        let download = download_root.join("123456 - Tower");
        fs::create_dir_all(&download).unwrap();

        let scripts_dir = root.join("scripts");
        let reftag_dir = root.join("reftags");
        write_templates(&scripts_dir, &reftag_dir);

        let config = AppConfig {
            projects_dir,
            download_root,
            log_dir: root.join("logs"),
            report_dir: root.join("reports"),
            scripts_dir,
            reftag_dir,
            cad_engine_path: root.join("engine"),
            metadata_db_path: root.join("meta.db"),
            max_workers: 4,
            max_parent_workers: 2,
            ignore_patterns: vec![],
            preview_converter_path: None,
        };

        let db = Database::open_in_memory().unwrap();
        db.insert_project(&ProjectRecord {
            number: PROJECT,
            name: "Tower".to_string(),
            internal_contact: None,
            external_contact: None,
        })
        .unwrap();

        Fixture {
            merge: inbox.join("VDC-MERGE"),
            tmp,
            config,
            db: Arc::new(db),
            download,
            inbox,
        }
    }

    pub fn trade(&self, abbreviation: &str, full_name: &str, owned: bool) -> &Self {
        self.db
            .insert_trade(
                PROJECT,
                &TradeRow {
                    abbreviation: abbreviation.to_string(),
                    owned,
                    full_name: full_name.to_string(),
                    subdirectory: String::new(),
                    color: "nochange".to_string(),
                    export_flag: false,
                    elevation_source: "JCC".to_string(),
                },
            )
            .unwrap();
        self
    }

    pub fn elevation(&self, level: &str, elevation: &str) -> &Self {
        self.db
            .insert_elevation(
                PROJECT,
                &ElevationRow {
                    level: level.to_string(),
                    elevation: Some(elevation.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        self
    }

    /// A CAD record: `external` downloads become `internal` in the merge folder.
    pub fn cad_record(&self, external: &str, trade: &str, level: &str, internal: &str, parent: Option<&str>) -> &Self {
        self.db
            .insert_file(
                PROJECT,
                &FileRow {
                    external_name: external.to_string(),
                    extension: "dwg".to_string(),
                    internal_name: Some(internal.to_string()),
                    trade_abbreviation: trade.to_string(),
                    level: Some(level.to_string()),
                    parent_name: parent.map(str::to_string),
                    action: "Clean".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        self
    }

    pub fn record(&self, external: &str, extension: &str, action: &str) -> &Self {
        self.db
            .insert_file(
                PROJECT,
                &FileRow {
                    external_name: external.to_string(),
                    extension: extension.to_string(),
                    action: action.to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        self
    }

    pub fn download(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.download.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn engine(&self, cad: Arc<dyn CadEngine>) -> UpdateEngine {
        let store: Arc<dyn MetadataStore> = self.db.clone();
        UpdateEngine::new(self.config.clone(), store, cad)
    }
}
