use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;

pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Output counts only if it exists and was written strictly after `since`.
/// A leftover from an earlier run fails this check.
pub fn verify_fresh(path: &Path, since: SystemTime) -> bool {
    match modified_time(path) {
        Some(modified) => {
            let fresh = modified > since;
            if !fresh {
                trace!("{} exists but is stale", path.display());
            }
            fresh
        }
        None => false,
    }
}
