use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::FeatureBand;

/// Identifier of one workload manifest family, e.g.
/// `microsoft.net.sdk.android`. Identity is ASCII case-insensitive; the
/// original spelling is preserved for display and serialization.
#[derive(Debug, Clone)]
pub struct ManifestId(String);

impl ManifestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for ManifestId {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for ManifestId {}

impl PartialOrd for ManifestId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ManifestId {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.0.bytes().map(|byte| byte.to_ascii_lowercase());
        let right = other.0.bytes().map(|byte| byte.to_ascii_lowercase());
        left.cmp(right)
    }
}

impl Hash for ManifestId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ManifestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for ManifestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ManifestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

/// A manifest version together with the feature band whose directory tree
/// holds it. Workload-set files spell this as `"<version>/<band>"`; a bare
/// version inherits the set's own band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVersion {
    pub version: String,
    pub feature_band: FeatureBand,
}

impl ManifestVersion {
    pub fn new(version: impl Into<String>, feature_band: FeatureBand) -> Self {
        Self {
            version: version.into(),
            feature_band,
        }
    }

    pub fn parse(value: &str, default_band: FeatureBand) -> Result<Self> {
        match value.split_once('/') {
            Some((version, band)) => Ok(Self {
                version: version.to_string(),
                feature_band: band
                    .parse()
                    .with_context(|| format!("invalid feature band in manifest version '{value}'"))?,
            }),
            None => Ok(Self {
                version: value.to_string(),
                feature_band: default_band,
            }),
        }
    }
}

impl fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.feature_band)
    }
}

/// A curated, atomically-versioned bundle pinning one version per manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSet {
    pub version: String,
    pub manifests: BTreeMap<ManifestId, ManifestVersion>,
}

impl WorkloadSet {
    /// Builds a set from the raw id-to-version map read out of a
    /// `*.workloadset.json` file.
    pub fn from_json_map(
        version: impl Into<String>,
        entries: &BTreeMap<String, String>,
        default_band: FeatureBand,
    ) -> Result<Self> {
        let version = version.into();
        let mut manifests = BTreeMap::new();
        for (id, value) in entries {
            let manifest_version = ManifestVersion::parse(value, default_band)
                .with_context(|| format!("workload set '{version}' entry '{id}'"))?;
            manifests.insert(ManifestId::new(id.as_str()), manifest_version);
        }
        Ok(Self { version, manifests })
    }

    /// Feature band the set belongs to, derived from its own version.
    pub fn feature_band(&self) -> Result<FeatureBand> {
        FeatureBand::from_sdk_version(&self.version)
    }
}

/// One workload manifest as found installed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub id: ManifestId,
    pub version: String,
    pub feature_band: FeatureBand,
    pub path: PathBuf,
}
