use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use loadout_core::{ManifestId, ManifestVersion};
use loadout_state::MANIFEST_FILE_NAME;

/// Result of asking a source whether it can supply a manifest package.
/// Callers branch on the variants explicitly; "not found" carries the
/// reason so it can surface in user-facing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLookup {
    Found(PathBuf),
    NotManaged,
    NotFound(String),
}

/// Supplies extracted manifest packages for repair. Transport and signature
/// verification live behind implementations of this trait; the engine only
/// decides what to fetch and where it must land.
pub trait ManifestPackageSource {
    fn locate(&self, id: &ManifestId, version: &ManifestVersion) -> PackageLookup;

    /// Copies the package contents for `id`/`version` into `dest`.
    fn stage(&self, id: &ManifestId, version: &ManifestVersion, dest: &Path) -> Result<()>;
}

/// Package source backed by a local directory laid out like the manifest
/// tree itself: `<root>/<band>/<id>/<version>/WorkloadManifest.json`.
#[derive(Debug, Clone)]
pub struct DirectoryPackageSource {
    root: PathBuf,
}

impl DirectoryPackageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn package_dir(&self, id: &ManifestId, version: &ManifestVersion) -> PathBuf {
        self.root
            .join(version.feature_band.to_string())
            .join(id.as_str())
            .join(&version.version)
    }
}

impl ManifestPackageSource for DirectoryPackageSource {
    fn locate(&self, id: &ManifestId, version: &ManifestVersion) -> PackageLookup {
        if !self.root.is_dir() {
            return PackageLookup::NotManaged;
        }
        let dir = self.package_dir(id, version);
        if dir.join(MANIFEST_FILE_NAME).is_file() {
            PackageLookup::Found(dir)
        } else {
            PackageLookup::NotFound(format!(
                "{} does not provide manifest {id} version {}",
                self.root.display(),
                version.version
            ))
        }
    }

    fn stage(&self, id: &ManifestId, version: &ManifestVersion, dest: &Path) -> Result<()> {
        match self.locate(id, version) {
            PackageLookup::Found(dir) => copy_dir_recursive(&dir, dest),
            PackageLookup::NotManaged => bail!(
                "package source {} is not available",
                self.root.display()
            ),
            PackageLookup::NotFound(reason) => bail!(reason),
        }
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("failed to create {}", to.display()))?;
    for entry in
        fs::read_dir(from).with_context(|| format!("failed to read {}", from.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read {}", from.display()))?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        if source.is_dir() {
            copy_dir_recursive(&source, &target)?;
        } else {
            fs::copy(&source, &target).with_context(|| {
                format!("failed to copy {} to {}", source.display(), target.display())
            })?;
        }
    }
    Ok(())
}
