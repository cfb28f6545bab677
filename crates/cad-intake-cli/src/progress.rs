use cad_intake_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// CLI progress reporter using indicatif progress bars.
///
/// - Preparation and file processing: bar over the files of the batch
/// - Parent combination: bar over the parents
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

fn bar_style(label: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} {{msg}}",
        label
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start_bar(&self, label: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(bar_style(label));
        pb.enable_steady_tick(Duration::from_millis(80));

        let mut guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn tick(&self, name: &str) {
        let guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pb) = guard.as_ref() {
            pb.set_message(name.to_string());
            pb.inc(1);
        }
    }

    pub fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_classified(&self, to_process: usize, to_copy: usize, ignored: usize, unknown: usize) {
        eprintln!(
            "  \x1b[32m✓\x1b[0m Classified: {} to process, {} to copy, {} ignored, {} unknown",
            to_process, to_copy, ignored, unknown
        );
    }

    fn on_prepare_start(&self, total: usize) {
        self.start_bar("Preparing ", total);
    }

    fn on_prepared(&self, name: &str, _success: bool) {
        self.tick(name);
    }

    fn on_execute_start(&self, total: usize) {
        self.start_bar("Processing", total);
    }

    fn on_file_complete(&self, name: &str, _success: bool) {
        self.tick(name);
    }

    fn on_execute_complete(&self, succeeded: usize, failed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Processing complete: {} succeeded, {} failed in {:.2}s",
            succeeded, failed, duration_secs
        );
    }

    fn on_combine_start(&self, parents: usize) {
        self.start_bar("Combining ", parents);
    }

    fn on_parent_complete(&self, name: &str, _success: bool) {
        self.tick(name);
    }

    fn on_copy_complete(&self, copied: usize, failed: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Copy complete: {} copied, {} failed",
            copied, failed
        );
    }
}
