use crate::error::{Error, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn default_workers() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub projects_dir: PathBuf,
    pub download_root: PathBuf,
    pub log_dir: PathBuf,
    pub report_dir: PathBuf,
    /// Master script templates and per-file extra scripts.
    pub scripts_dir: PathBuf,
    /// Reftag drawing templates and the tag text script.
    pub reftag_dir: PathBuf,
    pub cad_engine_path: PathBuf,
    pub metadata_db_path: PathBuf,
    #[serde(default = "default_workers")]
    pub max_workers: usize,
    #[serde(default = "default_workers")]
    pub max_parent_workers: usize,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub preview_converter_path: Option<PathBuf>,
}

/// Reads `Config.toml` (optional) overlaid with `CAD_INTAKE_*` environment variables.
pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("CAD_INTAKE"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

lazy_static::lazy_static! {
    static ref PROJECT_NUMBER: regex_lite::Regex = regex_lite::Regex::new(r"^\d{6}$").unwrap();
    static ref PROJECT_FOLDER: regex_lite::Regex = regex_lite::Regex::new(r"^(\d{6}) - (.+)$").unwrap();
}

pub fn parse_project_number(input: &str) -> Result<u32> {
    if !PROJECT_NUMBER.is_match(input) {
        return Err(Error::InvalidProjectNumber(input.to_string()));
    }
    input
        .parse::<u32>()
        .map_err(|_| Error::InvalidProjectNumber(input.to_string()))
}

/// Folders of one project that the pipeline reads from and writes to.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub number: u32,
    pub root: PathBuf,
    pub inbox: PathBuf,
    pub merge_root: PathBuf,
}

impl ProjectPaths {
    /// Find `<projects_dir>/<number> - <name>` and its coordination inbox.
    pub fn locate(projects_dir: &Path, number: u32) -> Result<Self> {
        let prefix = format!("{:06}", number);

        let candidates: Vec<PathBuf> = fs::read_dir(projects_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();

        let root = match candidates.as_slice() {
            [single] => single.clone(),
            _ => return Err(Error::ProjectFolderNotFound(prefix)),
        };

        let folder_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !PROJECT_FOLDER.is_match(&folder_name) {
            return Err(Error::ProjectFolderNotFound(prefix));
        }

        let inbox = root
            .join("01 Field Management")
            .join("04 Coordination")
            .join("INbox");
        if !inbox.is_dir() {
            return Err(Error::InboxNotFound(inbox));
        }

        let merge_root = inbox.join("VDC-MERGE");
        fs::create_dir_all(&merge_root)?;
        debug!("Project root {}, inbox {}", root.display(), inbox.display());

        Ok(ProjectPaths {
            number,
            root,
            inbox,
            merge_root,
        })
    }

    pub fn misc_dir(&self) -> PathBuf {
        self.merge_root.join("MISC")
    }
}

/// `<download_root>/<number> - <name>`, created when absent.
pub fn download_folder(download_root: &Path, number: u32, project_name: &str) -> Result<PathBuf> {
    let folder = download_root.join(format!("{:06} - {}", number, project_name));
    if !folder.exists() {
        warn!("Download folder not found. Creating {}", folder.display());
        fs::create_dir_all(&folder)?;
    }
    Ok(folder)
}
