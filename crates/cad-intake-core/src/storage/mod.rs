pub mod models;
pub mod queries;
pub mod sqlite;

pub use sqlite::Database;

use crate::model::{ElevationColumn, FileKey, FileRecord, FileStatus, InternalFileRecord, TradeRow};
use chrono::NaiveDateTime;
use models::ProjectRecord;
use rusqlite::Result;

/// Read paths used by the pipeline plus the single status/timestamp write path.
pub trait MetadataStore: Send + Sync {
    fn project(&self, project: u32) -> Result<Option<ProjectRecord>>;

    fn file_records(&self, project: u32) -> Result<Vec<FileRecord>>;

    fn trades(&self, project: u32) -> Result<Vec<TradeRow>>;

    /// Row for an incoming file, matched by external base name.
    fn internal_record(&self, project: u32, external_name: &str) -> Result<Option<InternalFileRecord>>;

    fn trade(&self, project: u32, abbreviation: &str) -> Result<Option<TradeRow>>;

    /// Elevation for a level, or for the level whose `level_above` matches when `by_level_above`.
    fn elevation(
        &self,
        project: u32,
        level: &str,
        by_level_above: bool,
        column: ElevationColumn,
    ) -> Result<Option<String>>;

    /// Internal names of every file declaring `parent_name` as its parent.
    fn child_internal_names(&self, project: u32, parent_name: &str) -> Result<Vec<String>>;

    fn set_status(&self, project: u32, key: &FileKey, status: FileStatus) -> Result<usize>;

    fn stamp_last_processed(&self, project: u32, key: &FileKey, at: NaiveDateTime) -> Result<usize>;
}
