use crate::model::{CadFile, InboxAssignment, PreparedCad};
use crate::tables;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const BATCH_TIMESTAMP_FORMAT: &str = "%Y-%m-%d(%H%M)";

pub fn batch_timestamp(now: NaiveDateTime) -> String {
    now.format(BATCH_TIMESTAMP_FORMAT).to_string()
}

/// `01,02,03` for fewer than five levels, otherwise `first-last`.
pub fn level_label<'a, I>(levels: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let distinct: Vec<&str> = levels.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

    if distinct.len() < 5 {
        distinct.join(",")
    } else {
        format!("{}-{}", distinct[0], distinct[distinct.len() - 1])
    }
}

/// One assignment per input, in input order. Files of one trade share a folder.
pub fn plan_inbox_folders(files: &[&PreparedCad], inbox_root: &Path, timestamp: &str) -> Vec<InboxAssignment> {
    let mut levels_by_trade: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for file in files {
        levels_by_trade
            .entry(file.trade.abbreviation.as_str())
            .or_default()
            .push(file.level.name.as_str());
    }

    let subdirectories: BTreeMap<&str, PathBuf> = levels_by_trade
        .into_iter()
        .map(|(abbreviation, levels)| {
            let dir_name = format!("{}_{}-{}", timestamp, abbreviation, level_label(levels));
            let subdirectory = PathBuf::from(tables::group_token(abbreviation)).join(dir_name);
            (abbreviation, subdirectory)
        })
        .collect();

    files
        .iter()
        .map(|file| {
            let subdirectory = subdirectories[file.trade.abbreviation.as_str()].clone();
            let directory = inbox_root.join(&subdirectory);
            InboxAssignment {
                save_as_path: directory.join(format!("{}.dwg", file.processed_base_name)),
                subdirectory,
                directory,
            }
        })
        .collect()
}

/// Assign folders to every prepared file of the batch. Unprepared files are left alone.
pub fn assign_inbox_folders(files: &mut [CadFile], inbox_root: &Path, timestamp: &str) {
    let plans = {
        let prepared: Vec<&PreparedCad> = files.iter().filter_map(|f| f.prepared.as_ref()).collect();
        plan_inbox_folders(&prepared, inbox_root, timestamp)
    };

    for (file, plan) in files
        .iter_mut()
        .filter(|f| f.prepare_successful())
        .zip(plans)
    {
        file.inbox = Some(plan);
    }
}
