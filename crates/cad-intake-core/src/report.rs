use crate::model::{TaskType, WorkItem};
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::info;

/// End-of-run summary, by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: Vec<String>,
    pub failed: Vec<String>,
    pub copied: Vec<String>,
    pub ignored: Vec<String>,
    pub unknown: Vec<String>,
    pub up_to_date: Vec<String>,
}

impl RunReport {
    /// Sort every work item into its category.
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut report = RunReport::default();
        for item in items {
            let name = item.name();
            match (item, item.task()) {
                (_, TaskType::Ignore) => report.ignored.push(name),
                (_, TaskType::Unknown) => report.unknown.push(name),
                (_, TaskType::UpToDate) => report.up_to_date.push(name),
                (WorkItem::Plain(_), TaskType::Copy) if item.succeeded() => report.copied.push(name),
                (_, _) if item.succeeded() => report.processed.push(name),
                _ => report.failed.push(name),
            }
        }
        report.sort();
        report
    }

    fn sort(&mut self) {
        for list in [
            &mut self.processed,
            &mut self.failed,
            &mut self.copied,
            &mut self.ignored,
            &mut self.unknown,
            &mut self.up_to_date,
        ] {
            list.sort();
        }
    }

    /// `(category, file)` pairs in report order.
    pub fn rows(&self) -> Vec<(&'static str, &str)> {
        let categories: [(&'static str, &Vec<String>); 6] = [
            ("processed", &self.processed),
            ("failed", &self.failed),
            ("copied", &self.copied),
            ("ignored", &self.ignored),
            ("unknown", &self.unknown),
            ("up_to_date", &self.up_to_date),
        ];
        categories
            .into_iter()
            .flat_map(|(category, names)| names.iter().map(move |n| (category, n.as_str())))
            .collect()
    }

    pub fn log(&self, show_unknown: bool, show_ignored: bool) {
        info!("{} files processed: {}", self.processed.len(), self.processed.join(", "));
        info!("{} files failed: {}", self.failed.len(), self.failed.join(", "));
        info!("{} files copied over: {}", self.copied.len(), self.copied.join(", "));
        if show_unknown {
            info!("{} files not recognized: {}", self.unknown.len(), self.unknown.join(", "));
        }
        if show_ignored {
            info!("{} files ignored: {}", self.ignored.len(), self.ignored.join(", "));
        }
    }

    /// Append rows to a CSV file, writing the header when the file is new.
    pub fn write_csv(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file_exists = path.exists();
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let mut wtr = csv::Writer::from_writer(file);

        if !file_exists {
            wtr.write_record(["category", "file"])?;
        }
        for (category, name) in self.rows() {
            wtr.write_record([category, name])?;
        }
        wtr.flush()?;
        Ok(())
    }
}
