use sha2::{Digest, Sha256};

use crate::{FeatureBand, ManifestRecord};

/// Synthesizes a workload version for loose-manifest resolutions, where no
/// workload set pins the state. The digest covers every installed manifest
/// so any drift in the set of manifests changes the rendered version, while
/// staying short enough to print: `8.0.200-manifests.9e7f4b21`.
pub fn loose_workload_version(band: FeatureBand, records: &[ManifestRecord]) -> String {
    let mut entries: Vec<String> = records
        .iter()
        .map(|record| format!("{}.{}.{}", record.id, record.feature_band, record.version))
        .collect();
    entries.sort();

    let digest = Sha256::digest(entries.join(";").as_bytes());
    format!("{band}-manifests.{}", hex::encode(&digest[..4]))
}
