mod feature_band;
mod loose_version;
mod versions;
mod workload_set;

pub use feature_band::FeatureBand;
pub use loose_version::loose_workload_version;
pub use versions::{compare_workload_versions, is_workload_version, max_workload_version};
pub use workload_set::{ManifestId, ManifestRecord, ManifestVersion, WorkloadSet};

#[cfg(test)]
mod tests;
