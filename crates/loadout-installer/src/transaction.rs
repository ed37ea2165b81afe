use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use loadout_core::{ManifestId, ManifestVersion};
use loadout_state::{rename_with_retry, StateLayout, MANIFEST_FILE_NAME};

use crate::source::ManifestPackageSource;

struct CommittedInstall {
    id: ManifestId,
    final_dir: PathBuf,
    backup_dir: Option<PathBuf>,
}

/// Staged-then-committed manifest installs. Every package is staged under a
/// private directory first and only then moved into its final location; a
/// pre-existing directory at the destination is renamed aside as a backup.
/// All installs in one transaction land or none do: the first failure
/// reverts every prior move in reverse order.
pub struct RepairTransaction {
    layout: StateLayout,
    staging_root: PathBuf,
    committed: Vec<CommittedInstall>,
}

impl RepairTransaction {
    pub fn begin(layout: &StateLayout) -> Result<Self> {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let staging_root = layout
            .staging_dir()
            .join(format!("repair-{}-{nanos}", std::process::id()));
        fs::create_dir_all(&staging_root)
            .with_context(|| format!("failed to create {}", staging_root.display()))?;
        Ok(Self {
            layout: layout.clone(),
            staging_root,
            committed: Vec::new(),
        })
    }

    /// Stages one manifest package and moves it into place. On failure the
    /// destination is untouched; the caller decides whether to roll back
    /// earlier installs.
    pub fn install_manifest(
        &mut self,
        source: &dyn ManifestPackageSource,
        id: &ManifestId,
        version: &ManifestVersion,
    ) -> Result<()> {
        let stage_dir = self
            .staging_root
            .join(format!("{id}-{}", version.version));
        source
            .stage(id, version, &stage_dir)
            .with_context(|| format!("failed to stage manifest {id} version {}", version.version))?;
        if !stage_dir.join(MANIFEST_FILE_NAME).is_file() {
            bail!(
                "staged package for {id} version {} does not contain {MANIFEST_FILE_NAME}",
                version.version
            );
        }

        let final_dir = self
            .layout
            .manifest_dir(version.feature_band, id, &version.version);
        if let Some(parent) = final_dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let backup_dir = if final_dir.exists() {
            let backup = self.staging_root.join(format!(
                "{id}-{}.backup",
                version.version
            ));
            rename_with_retry(&final_dir, &backup).with_context(|| {
                format!("failed to set aside existing manifest {id} version {}", version.version)
            })?;
            Some(backup)
        } else {
            None
        };

        if let Err(err) = rename_with_retry(&stage_dir, &final_dir) {
            // Put a displaced directory back before reporting; this keeps
            // the per-manifest step atomic from the caller's view.
            if let Some(backup) = &backup_dir {
                rename_with_retry(backup, &final_dir).map_err(|restore_err| {
                    anyhow!(
                        "failed to install manifest {id} ({err:#}) and could not restore {}: \
                         {restore_err:#}; inspect {} manually",
                        final_dir.display(),
                        backup.display()
                    )
                })?;
            }
            return Err(err)
                .with_context(|| format!("failed to install manifest {id} version {}", version.version));
        }

        self.committed.push(CommittedInstall {
            id: id.clone(),
            final_dir,
            backup_dir,
        });
        Ok(())
    }

    /// Finalizes the transaction: displaced backups and the staging root
    /// are removed. After commit the installs can no longer be reverted.
    pub fn commit(self) -> Result<()> {
        for install in &self.committed {
            if let Some(backup) = &install.backup_dir {
                fs::remove_dir_all(backup).with_context(|| {
                    format!(
                        "failed to remove superseded manifest backup: {}",
                        backup.display()
                    )
                })?;
            }
        }
        let _ = fs::remove_dir_all(&self.staging_root);
        Ok(())
    }

    /// Reverts every completed install in reverse order, restoring any
    /// directories that were renamed aside. Reversion continues past
    /// individual failures; if anything could not be restored the error
    /// names the directories that need manual inspection.
    pub fn roll_back(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        while let Some(install) = self.committed.pop() {
            if let Err(err) = fs::remove_dir_all(&install.final_dir) {
                failures.push(format!(
                    "{} ({}): {err}",
                    install.id,
                    install.final_dir.display()
                ));
                continue;
            }
            if let Some(backup) = &install.backup_dir {
                if let Err(err) = rename_with_retry(backup, &install.final_dir) {
                    failures.push(format!(
                        "{} (restore {} from {}): {err:#}",
                        install.id,
                        install.final_dir.display(),
                        backup.display()
                    ));
                }
            }
        }
        let _ = fs::remove_dir_all(&self.staging_root);

        if failures.is_empty() {
            Ok(())
        } else {
            bail!(
                "rollback left the manifest tree inconsistent; inspect manually: {}",
                failures.join("; ")
            )
        }
    }
}
