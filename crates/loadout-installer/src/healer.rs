use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use loadout_core::{ManifestId, ManifestVersion, WorkloadSet};
use loadout_resolver::ManifestProvider;
use loadout_state::{
    current_unix_timestamp, HistoryLedger, HistoryRecord, WorkloadStateSnapshot,
};

use crate::source::ManifestPackageSource;
use crate::transaction::RepairTransaction;

pub const REPAIR_COMMAND_NAME: &str = "workload repair";

/// What to do when the active workload set references manifests that are
/// absent on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthFailureMode {
    Ignore,
    Throw,
    Repair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthCheckState {
    NotChecked,
    Checked,
}

/// Cooperative cancellation for multi-manifest repairs, observed between
/// manifest-level steps rather than mid-copy.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The one-shot check already ran for this healer.
    AlreadyChecked,
    Healthy,
    /// Manifests are missing but the caller asked not to act on it.
    Ignored {
        missing: Vec<(ManifestId, ManifestVersion)>,
    },
    Repaired {
        installed: Vec<(ManifestId, ManifestVersion)>,
    },
}

/// Verifies the provider's resolution against disk reality and repairs it
/// on request. The check runs at most once per healer: manifest presence
/// cannot change under it without an install operation that would build a
/// fresh provider and healer anyway. The already-computed resolution is
/// reused rather than re-read, so the verdict cannot race with concurrent
/// installs mutating the install state.
pub struct ManifestHealer<'a> {
    provider: &'a ManifestProvider,
    source: Box<dyn ManifestPackageSource + 'a>,
    state: HealthCheckState,
}

impl<'a> ManifestHealer<'a> {
    pub fn new(
        provider: &'a ManifestProvider,
        source: Box<dyn ManifestPackageSource + 'a>,
    ) -> Self {
        Self {
            provider,
            source,
            state: HealthCheckState::NotChecked,
        }
    }

    pub fn ensure_manifests_healthy(
        &mut self,
        mode: HealthFailureMode,
        cancel: &CancelToken,
    ) -> Result<HealthOutcome> {
        if self.state == HealthCheckState::Checked {
            return Ok(HealthOutcome::AlreadyChecked);
        }
        self.state = HealthCheckState::Checked;

        let resolution = self.provider.resolution();
        let Some(set) = &resolution.workload_set else {
            return match &resolution.requested_version {
                // Loose-manifest mode has no set contract to verify.
                None => Ok(HealthOutcome::Healthy),
                Some(version) => match mode {
                    HealthFailureMode::Ignore => Ok(HealthOutcome::Ignored {
                        missing: Vec::new(),
                    }),
                    _ => bail!(
                        "workload set {version} is requested but not installed; \
                         it must be installed before its manifests can be verified"
                    ),
                },
            };
        };

        let missing = self.provider.missing_manifests();
        if missing.is_empty() {
            return Ok(HealthOutcome::Healthy);
        }

        match mode {
            HealthFailureMode::Ignore => Ok(HealthOutcome::Ignored { missing }),
            HealthFailureMode::Throw => {
                let names: Vec<String> = missing
                    .iter()
                    .map(|(id, version)| format!("{id} {}", version.version))
                    .collect();
                bail!(
                    "workload set {} is missing manifests: {}",
                    set.version,
                    names.join(", ")
                )
            }
            HealthFailureMode::Repair => self.repair(set, missing, cancel),
        }
    }

    fn repair(
        &self,
        set: &WorkloadSet,
        missing: Vec<(ManifestId, ManifestVersion)>,
        cancel: &CancelToken,
    ) -> Result<HealthOutcome> {
        let layout = self.provider.layout();
        let mut transaction = RepairTransaction::begin(layout)?;

        for (id, version) in &missing {
            if cancel.is_cancelled() {
                transaction
                    .roll_back()
                    .context("repair was cancelled and rollback failed")?;
                bail!("workload repair was cancelled; no manifests were changed");
            }
            if let Err(err) = transaction.install_manifest(self.source.as_ref(), id, version) {
                return match transaction.roll_back() {
                    Ok(()) => Err(err).with_context(|| {
                        format!(
                            "repair of workload set {} failed and was rolled back",
                            set.version
                        )
                    }),
                    Err(rollback_err) => Err(anyhow!(
                        "repair of workload set {} failed ({err:#}); {rollback_err:#}",
                        set.version
                    )),
                };
            }
        }
        transaction.commit()?;

        let record = HistoryRecord {
            time_started: current_unix_timestamp(),
            command_name: REPAIR_COMMAND_NAME.to_string(),
            global_json_version: self
                .provider
                .resolution()
                .global_json_path()
                .and_then(|_| self.provider.resolution().requested_version.clone()),
            state_before_command: snapshot_without(set, &missing),
            state_after_command: snapshot_full(set),
        };
        HistoryLedger::new(layout.clone(), self.provider.band())
            .append(&record)
            .context("repaired manifests but failed to record history")?;

        Ok(HealthOutcome::Repaired { installed: missing })
    }
}

fn snapshot_full(set: &WorkloadSet) -> WorkloadStateSnapshot {
    WorkloadStateSnapshot {
        workload_set_version: Some(set.version.clone()),
        manifests: set
            .manifests
            .iter()
            .map(|(id, version)| (id.clone(), version.version.clone()))
            .collect(),
    }
}

fn snapshot_without(
    set: &WorkloadSet,
    missing: &[(ManifestId, ManifestVersion)],
) -> WorkloadStateSnapshot {
    let absent: BTreeSet<&ManifestId> = missing.iter().map(|(id, _)| id).collect();
    WorkloadStateSnapshot {
        workload_set_version: Some(set.version.clone()),
        manifests: set
            .manifests
            .iter()
            .filter(|(id, _)| !absent.contains(id))
            .map(|(id, version)| (id.clone(), version.version.clone()))
            .collect(),
    }
}
