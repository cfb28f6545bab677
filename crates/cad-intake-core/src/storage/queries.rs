use super::models::*;
use super::sqlite::Database;
use super::MetadataStore;
use crate::model::{
    ElevationColumn, FileAction, FileKey, FileRecord, FileStatus, InternalFileRecord, TradeRow,
};
use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Result};
use tracing::{debug, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn parse_timestamp(value: Option<String>) -> Option<NaiveDateTime> {
    value.and_then(|v| match NaiveDateTime::parse_from_str(&v, TIMESTAMP_FORMAT) {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("Unreadable timestamp '{}': {}", v, e);
            None
        }
    })
}

fn format_timestamp(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
}

/// Blank strings in nullable columns are treated as null.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Database {
    // ── Loading ──────────────────────────────────────────────────

    pub fn insert_project(&self, project: &ProjectRecord) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO project (number, name, internal_contact, external_contact) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                project.number,
                project.name,
                project.internal_contact,
                project.external_contact
            ],
        )?;
        Ok(())
    }

    pub fn insert_file(&self, project: u32, file: &FileRow) -> Result<i64> {
        let conn = self.connection();
        conn.execute(
            "INSERT INTO vdc_file (project_number, external_name, extension, internal_name, \
             trade_abbreviation, level, parent_name, action, status, last_processed, scripts) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'Downloaded', ?9, ?10)",
            params![
                project,
                file.external_name,
                file.extension,
                file.internal_name,
                file.trade_abbreviation,
                file.level,
                file.parent_name,
                file.action,
                format_timestamp(file.last_processed),
                file.scripts,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_trade(&self, project: u32, trade: &TradeRow) -> Result<()> {
        self.connection().execute(
            "INSERT OR REPLACE INTO trade_info (project_number, abbreviation, owned, name, \
             subdirectory, color, export_flag, elevation_source) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project,
                trade.abbreviation,
                trade.owned,
                trade.full_name,
                trade.subdirectory,
                trade.color,
                trade.export_flag,
                trade.elevation_source,
            ],
        )?;
        Ok(())
    }

    pub fn insert_elevation(&self, project: u32, elevation: &ElevationRow) -> Result<()> {
        self.connection().execute(
            "INSERT INTO elevation (project_number, level, level_above, elevation, model_elevation) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project,
                elevation.level,
                elevation.level_above,
                elevation.elevation,
                elevation.model_elevation,
            ],
        )?;
        Ok(())
    }

    // ── Status reads ─────────────────────────────────────────────

    pub fn file_status(&self, project: u32, key: &FileKey) -> Result<Option<String>> {
        let (column, name) = key_column(key);
        self.connection()
            .query_row(
                &format!(
                    "SELECT status FROM vdc_file WHERE project_number = ?1 AND {} = ?2 COLLATE NOCASE",
                    column
                ),
                params![project, name],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map(Option::flatten)
    }

    pub fn last_processed(&self, project: u32, key: &FileKey) -> Result<Option<NaiveDateTime>> {
        let (column, name) = key_column(key);
        let value: Option<Option<String>> = self
            .connection()
            .query_row(
                &format!(
                    "SELECT last_processed FROM vdc_file WHERE project_number = ?1 AND {} = ?2 COLLATE NOCASE",
                    column
                ),
                params![project, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(parse_timestamp(value.flatten()))
    }
}

fn key_column(key: &FileKey) -> (&'static str, &str) {
    match key {
        FileKey::External(name) => ("external_name", name.as_str()),
        FileKey::Internal(name) => ("internal_name", name.as_str()),
    }
}

impl MetadataStore for Database {
    // ── Lookups ──────────────────────────────────────────────────

    fn project(&self, project: u32) -> Result<Option<ProjectRecord>> {
        self.connection()
            .query_row(
                "SELECT number, name, internal_contact, external_contact FROM project WHERE number = ?1",
                params![project],
                |row| {
                    Ok(ProjectRecord {
                        number: row.get(0)?,
                        name: row.get(1)?,
                        internal_contact: row.get(2)?,
                        external_contact: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    fn file_records(&self, project: u32) -> Result<Vec<FileRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT trade_abbreviation, external_name, extension, action, last_processed \
             FROM vdc_file WHERE project_number = ?1",
        )?;
        let records = stmt
            .query_map(params![project], |row| {
                Ok(FileRecord {
                    trade_abbreviation: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    external_name: row.get(1)?,
                    extension: row.get(2)?,
                    action: FileAction::parse(&row.get::<_, String>(3)?),
                    last_processed: parse_timestamp(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        debug!("{} file records for project {}", records.len(), project);
        Ok(records)
    }

    fn trades(&self, project: u32) -> Result<Vec<TradeRow>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT abbreviation, owned, name, subdirectory, color, export_flag, elevation_source \
             FROM trade_info WHERE project_number = ?1 ORDER BY abbreviation",
        )?;
        let trades = stmt
            .query_map(params![project], trade_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn internal_record(&self, project: u32, external_name: &str) -> Result<Option<InternalFileRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT level, trade_abbreviation, internal_name, parent_name, last_processed, scripts \
             FROM vdc_file WHERE project_number = ?1 AND external_name = ?2 COLLATE NOCASE \
             ORDER BY id",
        )?;
        let mut records = stmt
            .query_map(params![project, external_name], |row| {
                Ok(InternalFileRecord {
                    level: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    trade_abbreviation: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    internal_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    parent_name: non_blank(row.get(3)?),
                    last_processed: parse_timestamp(row.get(4)?),
                    scripts: non_blank(row.get(5)?),
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        if records.len() > 1 {
            warn!(
                "{} records match {} in project {}, using the first",
                records.len(),
                external_name,
                project
            );
        }
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    fn trade(&self, project: u32, abbreviation: &str) -> Result<Option<TradeRow>> {
        self.connection()
            .query_row(
                "SELECT abbreviation, owned, name, subdirectory, color, export_flag, elevation_source \
                 FROM trade_info WHERE project_number = ?1 AND abbreviation = ?2",
                params![project, abbreviation],
                trade_from_row,
            )
            .optional()
    }

    fn elevation(
        &self,
        project: u32,
        level: &str,
        by_level_above: bool,
        column: ElevationColumn,
    ) -> Result<Option<String>> {
        let value_column = match column {
            ElevationColumn::Surveyed => "elevation",
            ElevationColumn::Model => "model_elevation",
        };
        let level_column = if by_level_above { "level_above" } else { "level" };
        let value: Option<Option<String>> = self
            .connection()
            .query_row(
                &format!(
                    "SELECT {} FROM elevation WHERE project_number = ?1 AND {} = ?2 ORDER BY id LIMIT 1",
                    value_column, level_column
                ),
                params![project, level],
                |row| row.get(0),
            )
            .optional()?;
        Ok(non_blank(value.flatten()))
    }

    fn child_internal_names(&self, project: u32, parent_name: &str) -> Result<Vec<String>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT internal_name FROM vdc_file \
             WHERE project_number = ?1 AND parent_name = ?2 COLLATE NOCASE \
             AND internal_name IS NOT NULL ORDER BY internal_name",
        )?;
        let names = stmt
            .query_map(params![project, parent_name], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(names)
    }

    // ── Status writes ────────────────────────────────────────────

    fn set_status(&self, project: u32, key: &FileKey, status: FileStatus) -> Result<usize> {
        let (column, name) = key_column(key);
        let rows = self.connection().execute(
            &format!(
                "UPDATE vdc_file SET status = ?1 WHERE project_number = ?2 AND {} = ?3 COLLATE NOCASE",
                column
            ),
            params![status.as_str(), project, name],
        )?;
        Ok(rows)
    }

    fn stamp_last_processed(&self, project: u32, key: &FileKey, at: NaiveDateTime) -> Result<usize> {
        let (column, name) = key_column(key);
        let rows = self.connection().execute(
            &format!(
                "UPDATE vdc_file SET last_processed = ?1 WHERE project_number = ?2 AND {} = ?3 COLLATE NOCASE",
                column
            ),
            params![at.format(TIMESTAMP_FORMAT).to_string(), project, name],
        )?;
        Ok(rows)
    }
}

fn trade_from_row(row: &rusqlite::Row<'_>) -> Result<TradeRow> {
    Ok(TradeRow {
        abbreviation: row.get(0)?,
        owned: row.get::<_, i64>(1)? != 0,
        full_name: row.get(2)?,
        subdirectory: row.get(3)?,
        color: row.get(4)?,
        export_flag: row.get::<_, i64>(5)? != 0,
        elevation_source: row.get(6)?,
    })
}
