use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use loadout_core::{FeatureBand, ManifestId};

pub const WORKLOAD_SETS_FOLDER: &str = "workloadsets";
pub const MANIFEST_FILE_NAME: &str = "WorkloadManifest.json";

/// Path map for everything the engine persists under one SDK root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifests_root(&self) -> PathBuf {
        self.root.join("sdk-manifests")
    }

    pub fn band_manifests_dir(&self, band: FeatureBand) -> PathBuf {
        self.manifests_root().join(band.to_string())
    }

    pub fn manifest_dir(&self, band: FeatureBand, id: &ManifestId, version: &str) -> PathBuf {
        self.band_manifests_dir(band).join(id.as_str()).join(version)
    }

    pub fn manifest_file(&self, band: FeatureBand, id: &ManifestId, version: &str) -> PathBuf {
        self.manifest_dir(band, id, version).join(MANIFEST_FILE_NAME)
    }

    pub fn workload_sets_dir(&self, band: FeatureBand) -> PathBuf {
        self.band_manifests_dir(band).join(WORKLOAD_SETS_FOLDER)
    }

    pub fn workload_set_dir(&self, band: FeatureBand, set_version: &str) -> PathBuf {
        self.workload_sets_dir(band).join(set_version)
    }

    pub fn workloads_metadata_dir(&self) -> PathBuf {
        self.root.join("metadata").join("workloads")
    }

    pub fn band_metadata_dir(&self, band: FeatureBand) -> PathBuf {
        self.workloads_metadata_dir().join(band.to_string())
    }

    pub fn install_state_dir(&self, band: FeatureBand) -> PathBuf {
        self.band_metadata_dir(band).join("InstallState")
    }

    pub fn install_state_path(&self, band: FeatureBand) -> PathBuf {
        self.install_state_dir(band).join("default.json")
    }

    pub fn pin_table_path(&self, band: FeatureBand) -> PathBuf {
        self.install_state_dir(band).join("globaljsonworkloadsets.json")
    }

    pub fn history_dir(&self, band: FeatureBand) -> PathBuf {
        self.band_metadata_dir(band).join("history")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.workloads_metadata_dir().join("tmp")
    }

    pub fn ensure_base_dirs(&self, band: FeatureBand) -> Result<()> {
        for dir in [
            self.band_manifests_dir(band),
            self.workload_sets_dir(band),
            self.install_state_dir(band),
            self.history_dir(band),
            self.staging_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
