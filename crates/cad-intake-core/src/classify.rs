use crate::model::{FileAction, FileRecord, IncomingFile, TaskType, TradeRow, WorkItem};
use chrono::{DateTime, Local, NaiveDateTime};
use glob::Pattern;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::{error, trace};
use walkdir::WalkDir;

/// Every regular file under the download folder, sorted by path.
pub fn list_incoming(download_dir: &Path, ignore_globs: &[String]) -> io::Result<Vec<IncomingFile>> {
    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(download_dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(entry.path()))
        {
            trace!("Ignoring {} by pattern", entry.path().display());
            continue;
        }
        files.push(IncomingFile::from_path(entry.path())?);
    }
    Ok(files)
}

pub fn local_time(time: SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

/// Primary abbreviation of a trade field: `EL[LITE]` -> `EL`.
fn primary_abbreviation(trade_field: &str) -> &str {
    if trade_field.contains('[') && trade_field.contains(']') {
        trade_field
            .split('[')
            .next()
            .unwrap_or(trade_field)
    } else {
        trade_field
    }
}

fn is_owned_trade(trade_field: &str, trades: &[TradeRow]) -> bool {
    let abbreviation = primary_abbreviation(trade_field);
    // unknown trades act as a blank placeholder, which is never owned
    trades
        .iter()
        .find(|t| t.abbreviation == abbreviation)
        .map(|t| t.owned)
        .unwrap_or(false)
}

/// Decide the task for one incoming file. Pure; never fails.
pub fn classify(file: &IncomingFile, records: &[FileRecord], trades: &[TradeRow]) -> TaskType {
    let record = match records
        .iter()
        .find(|r| r.file_name().eq_ignore_ascii_case(&file.name))
    {
        Some(record) => record,
        None => return TaskType::Unknown,
    };

    if record.action == FileAction::Ignore || is_owned_trade(&record.trade_abbreviation, trades) {
        return TaskType::Ignore;
    }

    let last_processed = record.last_processed.unwrap_or(NaiveDateTime::MIN);
    let is_newer = local_time(file.modified) > last_processed;

    match (record.action, is_newer) {
        (FileAction::Clean, true) => TaskType::ProcessCad,
        (_, true) => TaskType::Copy,
        (_, false) => TaskType::UpToDate,
    }
}

pub fn classify_all(files: Vec<IncomingFile>, records: &[FileRecord], trades: &[TradeRow]) -> Vec<WorkItem> {
    files
        .into_iter()
        .map(|file| {
            let task = classify(&file, records, trades);
            trace!("{} -> {:?}", file.name, task);
            WorkItem::classified(file, task)
        })
        .collect()
}
