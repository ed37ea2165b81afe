mod provider;
mod scan;

pub use provider::{ManifestProvider, Resolution, ResolutionSource, WorkloadVersionInfo};
pub use scan::{available_workload_sets, find_workload_set, installed_manifests};
