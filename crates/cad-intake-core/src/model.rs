use crate::error::PrepareError;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Action recorded against a file in the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Unknown,
    Ignore,
    Copy,
    Clean,
}

impl FileAction {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" => FileAction::Ignore,
            "copy" => FileAction::Copy,
            "clean" => FileAction::Clean,
            _ => FileAction::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileAction::Unknown => "Unknown",
            FileAction::Ignore => "Ignore",
            FileAction::Copy => "Copy",
            FileAction::Clean => "Clean",
        }
    }
}

/// What the batch will do with an incoming file. Assigned once by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Unknown,
    Ignore,
    Copy,
    ProcessCad,
    UpToDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Downloaded,
    Processing,
    Ready,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Downloaded => "Downloaded",
            FileStatus::Processing => "Processing",
            FileStatus::Ready => "Ready",
            FileStatus::Failed => "Failed",
        }
    }
}

/// Which name column a status or timestamp write is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKey {
    External(String),
    Internal(String),
}

/// A project-level file row, read once per batch for classification.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub external_name: String,
    pub extension: String,
    pub trade_abbreviation: String,
    pub action: FileAction,
    pub last_processed: Option<NaiveDateTime>,
}

impl FileRecord {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.external_name, self.extension)
    }
}

/// The per-file row used during preparation.
#[derive(Debug, Clone)]
pub struct InternalFileRecord {
    pub level: String,
    pub trade_abbreviation: String,
    pub internal_name: String,
    pub parent_name: Option<String>,
    pub last_processed: Option<NaiveDateTime>,
    pub scripts: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationSource {
    /// Drawings already sit at coordinated elevation ("JCC").
    Coordinated,
    /// Elevation taken from construction documents ("CDS").
    Drawings,
    /// Elevation taken from the building model ("RVT").
    Model,
}

impl ElevationSource {
    pub fn parse(value: &str) -> Result<Self, PrepareError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "JCC" => Ok(ElevationSource::Coordinated),
            "CDS" => Ok(ElevationSource::Drawings),
            "RVT" => Ok(ElevationSource::Model),
            _ => Err(PrepareError::InvalidElevationSource(value.to_string())),
        }
    }

    pub fn shifts_geometry(&self) -> bool {
        matches!(self, ElevationSource::Drawings | ElevationSource::Model)
    }

    pub fn column(&self) -> ElevationColumn {
        match self {
            ElevationSource::Model => ElevationColumn::Model,
            _ => ElevationColumn::Surveyed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElevationColumn {
    Surveyed,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeColor {
    NoChange,
    Color(String),
}

impl TradeColor {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("nochange") || value.trim().is_empty() {
            TradeColor::NoChange
        } else {
            TradeColor::Color(value.trim().to_string())
        }
    }
}

/// Trade row as stored; the elevation selector is still raw text.
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub abbreviation: String,
    pub owned: bool,
    pub full_name: String,
    pub subdirectory: String,
    pub color: String,
    pub export_flag: bool,
    pub elevation_source: String,
}

impl TradeRow {
    pub fn resolve(&self) -> Result<Trade, PrepareError> {
        Ok(Trade {
            abbreviation: self.abbreviation.clone(),
            full_name: self.full_name.clone(),
            subdirectory: self.subdirectory.clone(),
            color: TradeColor::parse(&self.color),
            export_cross_section: self.export_flag,
            elevation_source: ElevationSource::parse(&self.elevation_source)?,
            owned: self.owned,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub abbreviation: String,
    pub full_name: String,
    pub subdirectory: String,
    pub color: TradeColor,
    pub export_cross_section: bool,
    pub elevation_source: ElevationSource,
    pub owned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub name: String,
    /// Signed feet-inches, e.g. `-0'0`.
    pub elevation: String,
    pub from_model: bool,
}

impl Level {
    /// `0'0` and `-0'0` both mean the drawing already sits at zero.
    pub fn is_zero(&self) -> bool {
        self.elevation.trim().trim_start_matches('-') == "0'0"
    }

    /// Elevation with its sign flipped, used to move geometry back to zero.
    pub fn shift_elevation(&self) -> String {
        let elevation = self.elevation.trim();
        match elevation.strip_prefix('-') {
            Some(positive) => positive.to_string(),
            None => format!("-{}", elevation),
        }
    }
}

/// A file found in the download folder.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub path: PathBuf,
    pub name: String,
    pub modified: SystemTime,
}

impl IncomingFile {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(IncomingFile {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            modified: metadata.modified()?,
        })
    }

    pub fn base_name(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub base_name: String,
    pub processed_path: PathBuf,
}

/// Everything preparation resolved for one CAD file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCad {
    pub trade: Trade,
    pub level: Level,
    pub sub_trade: Option<String>,
    pub processed_base_name: String,
    pub processed_path: PathBuf,
    pub parent: Option<ParentLink>,
    pub extra_scripts: Vec<PathBuf>,
    pub last_processed: Option<NaiveDateTime>,
}

impl PreparedCad {
    /// `ABBR-Lev01` or `ABBR[SUB]-Lev01`.
    pub fn tag_stem(&self) -> String {
        match &self.sub_trade {
            Some(sub) => format!("{}[{}]-Lev{}", self.trade.abbreviation, sub, self.level.name),
            None => format!("{}-Lev{}", self.trade.abbreviation, self.level.name),
        }
    }
}

/// Where a prepared file is staged inside the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxAssignment {
    /// Relative to the inbox root, e.g. `HP/2019-07-30(0856)_HP-01-06`.
    pub subdirectory: PathBuf,
    pub directory: PathBuf,
    pub save_as_path: PathBuf,
}

impl InboxAssignment {
    pub fn backup_dir(&self) -> PathBuf {
        self.directory.join("Backup")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.backup_dir().join("Scripts")
    }

    pub fn reftags_dir(&self) -> PathBuf {
        self.backup_dir().join("Reftags")
    }
}

/// Result of running the script pipeline on one file.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub template_path: Option<PathBuf>,
    pub merged_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CadFile {
    pub incoming: IncomingFile,
    pub task: TaskType,
    pub prepared: Option<PreparedCad>,
    /// Parent named by the store record, kept even when preparation fails.
    pub declared_parent: Option<String>,
    pub inbox: Option<InboxAssignment>,
    pub outcome: ExecutionOutcome,
}

impl CadFile {
    pub fn new(incoming: IncomingFile, task: TaskType) -> Self {
        CadFile {
            incoming,
            task,
            prepared: None,
            declared_parent: None,
            inbox: None,
            outcome: ExecutionOutcome::default(),
        }
    }

    pub fn prepare_successful(&self) -> bool {
        self.prepared.is_some()
    }

    /// Set only after the merge-directory copy passed the freshness check.
    pub fn execute_successful(&self) -> bool {
        self.prepare_successful() && self.outcome.merged_path.is_some()
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.prepared.as_ref().and_then(|p| p.parent.as_ref())
    }

    /// True when this file's record names `parent_name` as its parent,
    /// whether or not preparation got far enough to resolve the link.
    pub fn declares_parent(&self, parent_name: &str) -> bool {
        self.declared_parent
            .as_deref()
            .or_else(|| self.parent().map(|p| p.base_name.as_str()))
            .map(|name| name.eq_ignore_ascii_case(parent_name))
            .unwrap_or(false)
    }
}

/// Non-CAD file: ignored, unknown, up to date, or copied as-is.
#[derive(Debug, Clone)]
pub struct PlainFile {
    pub incoming: IncomingFile,
    pub task: TaskType,
    pub destination: Option<PathBuf>,
    pub copy_successful: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildState {
    pub base_name: String,
    pub execute_successful: bool,
}

/// Drawing recombined from per-area children.
#[derive(Debug, Clone)]
pub struct ParentFile {
    pub base_name: String,
    pub processed_path: PathBuf,
    pub inbox_directory: PathBuf,
    pub inbox_save_as_path: PathBuf,
    pub trade: Trade,
    pub level: Level,
    pub template_path: PathBuf,
    /// Expected children in the merge directory; some may be absent on disk.
    pub child_paths: Vec<PathBuf>,
    /// Children in this batch, including those that failed preparation.
    pub children: Vec<ChildState>,
    pub execute_successful: bool,
}

#[derive(Debug, Clone)]
pub enum WorkItem {
    Plain(PlainFile),
    Cad(CadFile),
    Parent(ParentFile),
}

impl WorkItem {
    pub fn classified(incoming: IncomingFile, task: TaskType) -> Self {
        match task {
            TaskType::ProcessCad | TaskType::UpToDate => WorkItem::Cad(CadFile::new(incoming, task)),
            _ => WorkItem::Plain(PlainFile {
                incoming,
                task,
                destination: None,
                copy_successful: false,
            }),
        }
    }

    pub fn task(&self) -> TaskType {
        match self {
            WorkItem::Plain(f) => f.task,
            WorkItem::Cad(f) => f.task,
            WorkItem::Parent(_) => TaskType::ProcessCad,
        }
    }

    pub fn name(&self) -> String {
        match self {
            WorkItem::Plain(f) => f.incoming.name.clone(),
            WorkItem::Cad(f) => f.incoming.name.clone(),
            WorkItem::Parent(p) => p
                .processed_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.base_name.clone()),
        }
    }

    /// Key for status writes: incoming files by external name, parents by internal name.
    pub fn status_key(&self) -> FileKey {
        match self {
            WorkItem::Plain(f) => FileKey::External(f.incoming.base_name()),
            WorkItem::Cad(f) => FileKey::External(f.incoming.base_name()),
            WorkItem::Parent(p) => FileKey::Internal(p.base_name.clone()),
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            WorkItem::Plain(f) => f.copy_successful,
            WorkItem::Cad(f) => f.execute_successful(),
            WorkItem::Parent(p) => p.execute_successful,
        }
    }
}
