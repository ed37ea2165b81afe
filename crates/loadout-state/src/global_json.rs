use std::fs;
use std::path::{Path, PathBuf};

/// Reads the workload-set version a global.json declares under
/// `{"sdk": {"workloadVersion": "..."}}`. Any read or parse failure, or a
/// missing declaration, means "no version requested"; a broken global.json
/// must never fail resolution.
pub fn workload_version_from_global_json(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value
        .get("sdk")?
        .get("workloadVersion")?
        .as_str()
        .map(str::to_string)
}

/// Finds the nearest global.json at or above `start_dir`.
pub fn find_global_json(start_dir: &Path) -> Option<PathBuf> {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join("global.json");
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
