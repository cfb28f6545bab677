/// Trait for reporting batch progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_classified(&self, _to_process: usize, _to_copy: usize, _ignored: usize, _unknown: usize) {}
    fn on_prepare_start(&self, _total: usize) {}
    fn on_prepared(&self, _name: &str, _success: bool) {}
    fn on_execute_start(&self, _total: usize) {}
    fn on_file_complete(&self, _name: &str, _success: bool) {}
    fn on_execute_complete(&self, _succeeded: usize, _failed: usize, _duration_secs: f64) {}
    fn on_combine_start(&self, _parents: usize) {}
    fn on_parent_complete(&self, _name: &str, _success: bool) {}
    fn on_copy_complete(&self, _copied: usize, _failed: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
