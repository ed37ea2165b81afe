mod global_json;
mod history;
mod install_state;
mod layout;
mod locking;
mod pins;

pub use global_json::{find_global_json, workload_version_from_global_json};
pub use history::{
    current_unix_timestamp, process_history, DisplayRecord, HistoryLedger, HistoryRecord,
    WorkloadStateSnapshot, INITIAL_STATE_COMMAND, UNLOGGED_CHANGES_COMMAND,
};
pub use install_state::{InstallState, InstallStateStore, WorkloadSetMode};
pub use layout::{StateLayout, MANIFEST_FILE_NAME, WORKLOAD_SETS_FOLDER};
pub use locking::{rename_with_retry, with_exclusive_lock, write_atomic};
pub use pins::GlobalJsonPinRegistry;

#[cfg(test)]
mod tests;
