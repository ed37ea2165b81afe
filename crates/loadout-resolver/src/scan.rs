use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use loadout_core::{max_workload_version, FeatureBand, ManifestId, ManifestRecord, WorkloadSet};
use loadout_state::{StateLayout, MANIFEST_FILE_NAME, WORKLOAD_SETS_FOLDER};

const WORKLOAD_SET_FILE_SUFFIX: &str = ".workloadset.json";

/// Scans the band's manifest directory and returns the newest installed
/// version of each manifest id, ordered by id. Only version directories that
/// actually contain a manifest file count as installed.
pub fn installed_manifests(
    layout: &StateLayout,
    band: FeatureBand,
) -> Result<Vec<ManifestRecord>> {
    let mut records = Vec::new();

    for id_entry in read_dir_entries(&layout.band_manifests_dir(band))? {
        if !id_entry.path().is_dir() {
            continue;
        }
        let name = id_entry.file_name().to_string_lossy().to_string();
        if name == WORKLOAD_SETS_FOLDER {
            continue;
        }
        let id = ManifestId::new(name);

        let mut versions = Vec::new();
        for version_entry in read_dir_entries(&id_entry.path())? {
            if version_entry.path().join(MANIFEST_FILE_NAME).is_file() {
                versions.push(version_entry.file_name().to_string_lossy().to_string());
            }
        }

        let newest = max_workload_version(versions.iter().map(String::as_str))
            .with_context(|| format!("unrecognized manifest version for '{id}'"))?;
        if let Some(version) = newest {
            records.push(ManifestRecord {
                path: layout.manifest_dir(band, &id, version),
                version: version.to_string(),
                feature_band: band,
                id,
            });
        }
    }

    records.sort_by(|left, right| left.id.cmp(&right.id));
    Ok(records)
}

/// Enumerates the workload sets installed for one feature band, keyed by set
/// version. Set folders whose version does not belong to the band are
/// skipped rather than treated as errors; another band's SDK owns those.
pub fn available_workload_sets(
    layout: &StateLayout,
    band: FeatureBand,
) -> Result<BTreeMap<String, WorkloadSet>> {
    let mut sets = BTreeMap::new();

    for entry in read_dir_entries(&layout.workload_sets_dir(band))? {
        if !entry.path().is_dir() {
            continue;
        }
        let set_version = entry.file_name().to_string_lossy().to_string();
        match FeatureBand::from_sdk_version(&set_version) {
            Ok(set_band) if set_band == band => {}
            _ => continue,
        }
        if let Some(set) = load_workload_set_dir(&entry.path(), &set_version, band)? {
            sets.insert(set_version, set);
        }
    }

    Ok(sets)
}

/// Loads one workload set by version. The band's own `workloadsets` folder
/// is checked first; when the set version belongs to a different feature
/// band, that band's folder is checked as a fallback, so a global.json can
/// pin a set from a newer band than the running SDK's.
pub fn find_workload_set(
    layout: &StateLayout,
    band: FeatureBand,
    set_version: &str,
) -> Result<Option<WorkloadSet>> {
    let dir = layout.workload_set_dir(band, set_version);
    if let Some(set) = load_workload_set_dir(&dir, set_version, band)? {
        return Ok(Some(set));
    }

    if let Ok(own_band) = FeatureBand::from_sdk_version(set_version) {
        if own_band != band {
            let dir = layout.workload_set_dir(own_band, set_version);
            return load_workload_set_dir(&dir, set_version, own_band);
        }
    }
    Ok(None)
}

/// Merges every `*.workloadset.json` file in a set-version folder into one
/// set. Returns `None` when the folder is absent or holds no set files.
fn load_workload_set_dir(
    dir: &Path,
    set_version: &str,
    band: FeatureBand,
) -> Result<Option<WorkloadSet>> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    let mut found_any = false;

    for entry in read_dir_entries(dir)? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.ends_with(WORKLOAD_SET_FILE_SUFFIX) || !path.is_file() {
            continue;
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read workload set file: {}", path.display()))?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("malformed workload set file: {}", path.display()))?;
        merged.extend(entries);
        found_any = true;
    }

    if !found_any {
        return Ok(None);
    }
    let set = WorkloadSet::from_json_map(set_version, &merged, band)?;
    Ok(Some(set))
}

/// Lists a directory, treating a missing directory as empty.
fn read_dir_entries(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };
    entries
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("failed to read {}", dir.display()))
}
