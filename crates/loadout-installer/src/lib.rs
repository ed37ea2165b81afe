mod healer;
mod source;
mod transaction;

pub use healer::{
    CancelToken, HealthFailureMode, HealthOutcome, ManifestHealer, REPAIR_COMMAND_NAME,
};
pub use source::{DirectoryPackageSource, ManifestPackageSource, PackageLookup};
pub use transaction::RepairTransaction;
