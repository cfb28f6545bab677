use std::path::PathBuf;
use thiserror::Error;

/// Batch-level failures. Only these stop a run, and only before per-file work begins.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid project number: {0}")]
    InvalidProjectNumber(String),

    #[error("Project folder not found for {0}")]
    ProjectFolderNotFound(String),

    #[error("Project {0} not found in metadata store")]
    ProjectNotFound(u32),

    #[error("Inbox folder not found: {}", .0.display())]
    InboxNotFound(PathBuf),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("No file match found: {0}")]
    NoFileRecord(String),

    #[error("Script not found \"{}\"", .0.display())]
    ScriptNotFound(PathBuf),

    #[error("Trade {abbreviation} not found for {project}")]
    TradeNotFound { abbreviation: String, project: u32 },

    #[error("Invalid elevation type: {0}")]
    InvalidElevationSource(String),

    #[error("Elevation not found for {0}")]
    ElevationNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Script template unreadable \"{}\": {source}", .path.display())]
    Template {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Script file not found: {}", .0.display())]
    ScriptMissing(PathBuf),

    #[error("Reftag template not found at: {}", .0.display())]
    ReftagTemplateMissing(PathBuf),

    #[error("RefTag could not be created: {}", .0.display())]
    ReftagNotCreated(PathBuf),

    #[error("Exported file was not created: {}", .0.display())]
    ExportMissing(PathBuf),

    #[error("File {0} could not be inserted into template")]
    InsertFailed(String),

    #[error("File {0} could not be copied to the merge directory")]
    DeliveryFailed(String),

    #[error("CAD engine could not be launched: {0}")]
    Launch(std::io::Error),

    #[error("Worker panicked while processing {0}")]
    Panicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Could not backup file {name}: {reason}")]
    Exhausted { name: String, reason: String },

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CombineError {
    #[error("No child files found for: {0}")]
    NoChildren(String),

    #[error("Parent file {0} was not processed because one or more of its children were not processed successfully")]
    ChildFailed(String),

    #[error("Parent file {0} could not be created")]
    NotCreated(String),

    #[error("Parent file {0} could not be copied to the merge directory")]
    DeliveryFailed(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
