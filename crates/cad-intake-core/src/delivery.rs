use crate::freshness::modified_time;
use crate::model::PlainFile;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Copy a non-CAD file into the merge `MISC` folder, overwriting.
///
/// Succeeds when the destination exists afterwards and is no older than
/// whatever was there before.
pub fn deliver_copy(file: &mut PlainFile, misc_dir: &Path) {
    let destination = misc_dir.join(&file.incoming.name);
    file.destination = Some(destination.clone());

    if let Err(e) = fs::create_dir_all(misc_dir) {
        error!("Could not create {}: {}", misc_dir.display(), e);
        file.copy_successful = false;
        return;
    }

    let previous = modified_time(&destination);

    if let Err(e) = fs::copy(&file.incoming.path, &destination) {
        error!("Could not copy over file {}: {}", file.incoming.name, e);
    }

    file.copy_successful = match (modified_time(&destination), previous) {
        (Some(now), Some(before)) => now >= before,
        (Some(_), None) => true,
        (None, _) => false,
    };

    if file.copy_successful {
        info!("Copied {} to {}", file.incoming.name, destination.display());
    }
}
