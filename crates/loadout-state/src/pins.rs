use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use loadout_core::FeatureBand;

use crate::global_json::workload_version_from_global_json;
use crate::install_state::lock_path;
use crate::locking::{with_exclusive_lock, write_atomic};
use crate::StateLayout;

/// Maps global.json paths to the workload-set version they request. Pins
/// exist only as garbage-collection roots: once a global.json stops asking
/// for the recorded version, the pin must not survive, so every enumeration
/// re-reads the live files and prunes stale entries.
#[derive(Debug, Clone)]
pub struct GlobalJsonPinRegistry {
    layout: StateLayout,
    band: FeatureBand,
}

impl GlobalJsonPinRegistry {
    pub fn new(layout: StateLayout, band: FeatureBand) -> Self {
        Self { layout, band }
    }

    /// Upserts the pin for one global.json. The exclusive lock spans the
    /// whole read-modify-write so concurrent SDK invocations cannot drop
    /// each other's entries.
    pub fn record_pin(&self, global_json_path: &Path, workload_set_version: &str) -> Result<()> {
        let table_path = self.layout.pin_table_path(self.band);
        with_exclusive_lock(&lock_path(&table_path), || {
            let mut table = read_pin_table(&table_path);
            table.insert(
                global_json_path.to_string_lossy().to_string(),
                workload_set_version.to_string(),
            );
            write_pin_table(&table_path, &table)
        })
    }

    /// Returns the pins whose global.json still declares the recorded
    /// version. Entries whose file is gone, unreadable, undeclared, or
    /// changed are dropped from the result and pruned from the persisted
    /// table; the table is rewritten only when something was dropped.
    pub fn live_pins(&self) -> Result<BTreeMap<PathBuf, String>> {
        let table_path = self.layout.pin_table_path(self.band);
        with_exclusive_lock(&lock_path(&table_path), || {
            let table = read_pin_table(&table_path);
            let mut live = BTreeMap::new();
            let mut dropped_any = false;

            for (path, recorded_version) in &table {
                match workload_version_from_global_json(Path::new(path)) {
                    Some(declared) if declared == *recorded_version => {
                        live.insert(PathBuf::from(path), recorded_version.clone());
                    }
                    _ => dropped_any = true,
                }
            }

            if dropped_any {
                let pruned: BTreeMap<String, String> = live
                    .iter()
                    .map(|(path, version)| (path.to_string_lossy().to_string(), version.clone()))
                    .collect();
                write_pin_table(&table_path, &pruned)?;
            }

            Ok(live)
        })
    }
}

fn read_pin_table(path: &Path) -> BTreeMap<String, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(_) => return BTreeMap::new(),
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

fn write_pin_table(path: &Path, table: &BTreeMap<String, String>) -> Result<()> {
    let contents = serde_json::to_string_pretty(table)
        .with_context(|| format!("failed serializing pin table: {}", path.display()))?;
    write_atomic(path, &contents)
        .with_context(|| format!("failed writing pin table: {}", path.display()))
}
