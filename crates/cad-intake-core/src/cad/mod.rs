//! The external CAD console. Runs a script against a drawing and reports
//! nothing back; callers judge success from files on disk.

pub mod scripts;

use crate::error::ExecutionError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub use scripts::ScriptTemplates;

pub trait CadEngine: Send + Sync {
    /// Blocks until the engine exits. `Ok` only means the process ran.
    fn run(&self, drawing: &Path, script: &Path) -> Result<(), ExecutionError>;
}

/// Launches the vendor console executable.
pub struct ConsoleEngine {
    executable: PathBuf,
    script_polls: u32,
    poll_interval: Duration,
}

impl ConsoleEngine {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            script_polls: 5,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_polling(mut self, script_polls: u32, poll_interval: Duration) -> Self {
        self.script_polls = script_polls;
        self.poll_interval = poll_interval;
        self
    }
}

/// Wait for a freshly written script to become visible.
pub fn wait_for_script(script: &Path, polls: u32, interval: Duration) -> Result<(), ExecutionError> {
    let mut attempts = 0;
    while !script.exists() {
        thread::sleep(interval);
        attempts += 1;
        if attempts >= polls {
            return Err(ExecutionError::ScriptMissing(script.to_path_buf()));
        }
    }
    Ok(())
}

impl CadEngine for ConsoleEngine {
    fn run(&self, drawing: &Path, script: &Path) -> Result<(), ExecutionError> {
        wait_for_script(script, self.script_polls, self.poll_interval)?;

        debug!(
            "{} /i {} /s {} /isolate",
            self.executable.display(),
            drawing.display(),
            script.display()
        );

        let status = Command::new(&self.executable)
            .arg("/i")
            .arg(drawing)
            .arg("/s")
            .arg(script)
            .arg("/isolate")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(ExecutionError::Launch)?;

        debug!("CAD engine exited with {:?} for {}", status.code(), drawing.display());
        Ok(())
    }
}
