use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use loadout_core::{
    loose_workload_version, max_workload_version, FeatureBand, ManifestId, ManifestRecord,
    ManifestVersion, WorkloadSet,
};
use loadout_state::{
    find_global_json, workload_version_from_global_json, GlobalJsonPinRegistry,
    InstallStateStore, StateLayout, MANIFEST_FILE_NAME,
};

use crate::scan::{available_workload_sets, find_workload_set, installed_manifests};

/// Where the active workload configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The nearest global.json declared a workload-set version.
    GlobalJson { path: PathBuf },
    /// The install state pins a workload-set version.
    InstallState,
    /// No pin anywhere; the newest installed set was chosen.
    LatestInstalled,
    /// Individual manifests resolved without a workload set.
    LooseManifests,
}

/// The outcome of one resolution pass, computed once at provider
/// construction. A requested version without a loaded set means the set is
/// not installed; that is representable output, not an error.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub source: ResolutionSource,
    pub requested_version: Option<String>,
    pub workload_set: Option<WorkloadSet>,
    pub loose_pins: Option<BTreeMap<ManifestId, ManifestVersion>>,
    pub workload_sets_enabled_without_set: bool,
}

impl Resolution {
    pub fn global_json_path(&self) -> Option<&Path> {
        match &self.source {
            ResolutionSource::GlobalJson { path } => Some(path),
            _ => None,
        }
    }
}

/// The resolved workload version as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadVersionInfo {
    pub version: String,
    pub is_installed: bool,
    pub workload_sets_enabled_without_set: bool,
    pub global_json_path: Option<PathBuf>,
}

/// Resolves the authoritative workload state for one feature band. The
/// resolution ladder runs once at construction: a global.json declaration
/// wins unconditionally, then the install-state pin, then the newest
/// installed set when sets are enabled, then loose manifests.
#[derive(Debug)]
pub struct ManifestProvider {
    layout: StateLayout,
    band: FeatureBand,
    resolution: Resolution,
}

impl ManifestProvider {
    /// A band override must name the current band or a newer one; asking
    /// for an older band is a user error, never silently clamped.
    pub fn new(
        layout: StateLayout,
        sdk_band: FeatureBand,
        band_override: Option<FeatureBand>,
        working_dir: &Path,
    ) -> Result<Self> {
        if let Some(requested) = band_override {
            if requested < sdk_band {
                bail!(
                    "feature band {requested} is lower than the current band {sdk_band}; \
                     only the current or a newer band can be targeted"
                );
            }
        }
        let band = band_override.unwrap_or(sdk_band);
        let resolution = resolve(&layout, band, working_dir)?;
        Ok(Self {
            layout,
            band,
            resolution,
        })
    }

    pub fn band(&self) -> FeatureBand {
        self.band
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn version_info(&self) -> Result<WorkloadVersionInfo> {
        let global_json_path = self.resolution.global_json_path().map(Path::to_path_buf);
        match &self.resolution.requested_version {
            Some(version) => Ok(WorkloadVersionInfo {
                version: version.clone(),
                is_installed: self.resolution.workload_set.is_some(),
                workload_sets_enabled_without_set: false,
                global_json_path,
            }),
            None => {
                let records = self.manifest_records()?;
                Ok(WorkloadVersionInfo {
                    version: loose_workload_version(self.band, &records),
                    is_installed: true,
                    workload_sets_enabled_without_set: self
                        .resolution
                        .workload_sets_enabled_without_set,
                    global_json_path,
                })
            }
        }
    }

    /// The full manifest list for the current resolution, ordered by id.
    /// Fails with an actionable message when the requested set is not
    /// installed or references a manifest that is absent on disk.
    pub fn manifest_records(&self) -> Result<Vec<ManifestRecord>> {
        if let Some(set) = &self.resolution.workload_set {
            return self.records_for_set(set);
        }
        if let Some(version) = &self.resolution.requested_version {
            match self.resolution.global_json_path() {
                Some(path) => bail!(
                    "workload version {version} requested by {} is not installed",
                    path.display()
                ),
                None => bail!("workload version {version} is recorded but not installed"),
            }
        }
        if let Some(pins) = &self.resolution.loose_pins {
            let mut records = Vec::new();
            for (id, manifest_version) in pins {
                match self.installed_record(id, manifest_version) {
                    Some(record) => records.push(record),
                    None => bail!(
                        "pinned manifest {id} version {} is not installed",
                        manifest_version.version
                    ),
                }
            }
            return Ok(records);
        }
        installed_manifests(&self.layout, self.band)
    }

    /// The manifests the active workload set references that are absent on
    /// disk. Empty in loose-manifest mode; presence there is definitional.
    pub fn missing_manifests(&self) -> Vec<(ManifestId, ManifestVersion)> {
        let Some(set) = &self.resolution.workload_set else {
            return Vec::new();
        };
        set.manifests
            .iter()
            .filter(|(id, manifest_version)| self.installed_record(id, manifest_version).is_none())
            .map(|(id, manifest_version)| (id.clone(), manifest_version.clone()))
            .collect()
    }

    fn records_for_set(&self, set: &WorkloadSet) -> Result<Vec<ManifestRecord>> {
        let mut records = Vec::new();
        for (id, manifest_version) in &set.manifests {
            match self.installed_record(id, manifest_version) {
                Some(record) => records.push(record),
                None => bail!(
                    "workload set {} references manifest {id} version {} which is not installed",
                    set.version,
                    manifest_version
                ),
            }
        }
        Ok(records)
    }

    fn installed_record(
        &self,
        id: &ManifestId,
        manifest_version: &ManifestVersion,
    ) -> Option<ManifestRecord> {
        let path =
            self.layout
                .manifest_dir(manifest_version.feature_band, id, &manifest_version.version);
        if !path.join(MANIFEST_FILE_NAME).is_file() {
            return None;
        }
        Some(ManifestRecord {
            id: id.clone(),
            version: manifest_version.version.clone(),
            feature_band: manifest_version.feature_band,
            path,
        })
    }
}

fn resolve(layout: &StateLayout, band: FeatureBand, working_dir: &Path) -> Result<Resolution> {
    if let Some(path) = find_global_json(working_dir) {
        if let Some(version) = workload_version_from_global_json(&path) {
            // Recorded even when the set is not installed, so the pin can
            // root garbage collection once it is.
            GlobalJsonPinRegistry::new(layout.clone(), band).record_pin(&path, &version)?;
            let workload_set = find_workload_set(layout, band, &version)?;
            return Ok(Resolution {
                source: ResolutionSource::GlobalJson { path },
                requested_version: Some(version),
                workload_set,
                loose_pins: None,
                workload_sets_enabled_without_set: false,
            });
        }
    }

    let state = InstallStateStore::new(layout.clone()).load(band);
    let sets_enabled = state.mode().workload_sets_enabled();

    if sets_enabled {
        if let Some(version) = state.workload_version.clone() {
            let workload_set = find_workload_set(layout, band, &version)?;
            return Ok(Resolution {
                source: ResolutionSource::InstallState,
                requested_version: Some(version),
                workload_set,
                loose_pins: None,
                workload_sets_enabled_without_set: false,
            });
        }

        let mut sets = available_workload_sets(layout, band)?;
        let newest =
            max_workload_version(sets.keys().map(String::as_str))?.map(str::to_string);
        if let Some(version) = newest {
            let workload_set = sets.remove(&version);
            return Ok(Resolution {
                source: ResolutionSource::LatestInstalled,
                requested_version: Some(version),
                workload_set,
                loose_pins: None,
                workload_sets_enabled_without_set: false,
            });
        }
    }

    let loose_pins = state.manifests.map(|pins| {
        pins.into_iter()
            .map(|(id, version)| (id, ManifestVersion::new(version, band)))
            .collect()
    });
    Ok(Resolution {
        source: ResolutionSource::LooseManifests,
        requested_version: None,
        workload_set: None,
        loose_pins,
        workload_sets_enabled_without_set: sets_enabled,
    })
}
