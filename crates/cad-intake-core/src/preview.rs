//! Optional review-model export of processed drawings.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct PreviewConverter {
    executable: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
}

impl PreviewConverter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Convert `drawing` to a `.nwd` beside it and remove the intermediate `.nwc`.
    pub fn convert(&self, drawing: &Path) -> io::Result<PathBuf> {
        let output = drawing.with_extension("nwd");

        let mut child = Command::new(&self.executable)
            .arg("-nogui")
            .arg("-exit")
            .arg("-nwd")
            .arg(&output)
            .arg(drawing)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let started = Instant::now();
        loop {
            if child.try_wait()?.is_some() {
                break;
            }
            if started.elapsed() >= self.timeout {
                warn!("Preview of {} timed out", drawing.display());
                let _ = child.kill();
                let _ = child.wait();
                break;
            }
            thread::sleep(self.poll_interval);
        }

        let intermediate = drawing.with_extension("nwc");
        if intermediate.exists() {
            fs::remove_file(&intermediate)?;
        }

        if output.exists() {
            Ok(output)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} was not created", output.display()),
            ))
        }
    }

    /// Convert one drawing, logging instead of failing.
    pub fn preview(&self, drawing: &Path) -> bool {
        match self.convert(drawing) {
            Ok(output) => {
                info!("Created preview {}", output.display());
                true
            }
            Err(e) => {
                warn!("Could not create preview for {}: {}", drawing.display(), e);
                false
            }
        }
    }
}
