use std::path::{Path, PathBuf};

const UPDATER_CANDIDATES: &[&str] = &["OTA/bin/updater", "updater", "update-binary"];

/// Finds the updater binary inside a target-files style input directory.
pub fn resolve_update_binary(input_dir: &Path) -> Option<PathBuf> {
    UPDATER_CANDIDATES
        .iter()
        .map(|rel| input_dir.join(rel))
        .find(|candidate| candidate.is_file())
}
