use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use loadout_core::{FeatureBand, ManifestId};
use serde::{Deserialize, Serialize};

use crate::locking::{with_exclusive_lock, write_atomic};
use crate::StateLayout;

/// Whether resolution should prefer workload sets or loose manifests for a
/// feature band. `Unset` behaves like `UseWorkloadSets`; the variant exists
/// so the persisted absence of the field stays distinguishable from an
/// explicit choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadSetMode {
    Unset,
    UseWorkloadSets,
    UseLooseManifests,
}

impl WorkloadSetMode {
    pub fn workload_sets_enabled(self) -> bool {
        !matches!(self, Self::UseLooseManifests)
    }
}

/// Per-feature-band installation configuration, persisted as
/// `InstallState/default.json`. All fields are optional; an absent file and
/// an empty record are equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_workload_sets: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifests: Option<BTreeMap<ManifestId, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_version: Option<String>,
}

impl InstallState {
    pub fn mode(&self) -> WorkloadSetMode {
        match self.use_workload_sets {
            None => WorkloadSetMode::Unset,
            Some(true) => WorkloadSetMode::UseWorkloadSets,
            Some(false) => WorkloadSetMode::UseLooseManifests,
        }
    }
}

/// Reads and writes the per-band install-state file. Loads substitute
/// defaults for missing or malformed state; a corrupt file here must never
/// block resolution. Writes hold an exclusive cross-process lock for the
/// whole read-modify-write cycle and land atomically.
#[derive(Debug, Clone)]
pub struct InstallStateStore {
    layout: StateLayout,
}

impl InstallStateStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn load(&self, band: FeatureBand) -> InstallState {
        read_state(&self.layout.install_state_path(band))
    }

    pub fn save(&self, band: FeatureBand, state: &InstallState) -> Result<()> {
        let path = self.layout.install_state_path(band);
        with_exclusive_lock(&lock_path(&path), || write_state(&path, state))
    }

    /// Locked read-modify-write of the install state.
    pub fn update(
        &self,
        band: FeatureBand,
        mutate: impl FnOnce(&mut InstallState),
    ) -> Result<InstallState> {
        let path = self.layout.install_state_path(band);
        with_exclusive_lock(&lock_path(&path), || {
            let mut state = read_state(&path);
            mutate(&mut state);
            write_state(&path, &state)?;
            Ok(state)
        })
    }
}

pub(crate) fn lock_path(data_path: &std::path::Path) -> PathBuf {
    let file_name = data_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    data_path.with_file_name(format!("{file_name}.lock"))
}

fn read_state(path: &std::path::Path) -> InstallState {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return InstallState::default(),
        Err(_) => return InstallState::default(),
    };

    serde_json::from_str(&raw).unwrap_or_default()
}

fn write_state(path: &std::path::Path, state: &InstallState) -> Result<()> {
    let contents = serde_json::to_string_pretty(state)
        .with_context(|| format!("failed serializing install state: {}", path.display()))?;
    write_atomic(path, &contents)
        .with_context(|| format!("failed writing install state: {}", path.display()))
}
