use chrono::NaiveDateTime;

/// A project row.
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub number: u32,
    pub name: String,
    pub internal_contact: Option<String>,
    pub external_contact: Option<String>,
}

/// A full file row, used when loading a project into the store.
#[derive(Debug, Clone, Default)]
pub struct FileRow {
    pub external_name: String,
    pub extension: String,
    pub internal_name: Option<String>,
    pub trade_abbreviation: String,
    pub level: Option<String>,
    pub parent_name: Option<String>,
    pub action: String,
    pub last_processed: Option<NaiveDateTime>,
    pub scripts: Option<String>,
}

/// An elevation row. `elevation` is surveyed, `model_elevation` comes from the building model.
#[derive(Debug, Clone, Default)]
pub struct ElevationRow {
    pub level: String,
    pub level_above: Option<String>,
    pub elevation: Option<String>,
    pub model_elevation: Option<String>,
}
