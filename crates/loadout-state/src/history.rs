use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use loadout_core::{FeatureBand, ManifestId};
use serde::{Deserialize, Serialize};

use crate::locking::write_atomic;
use crate::StateLayout;

pub const INITIAL_STATE_COMMAND: &str = "InitialState";
pub const UNLOGGED_CHANGES_COMMAND: &str = "Unlogged Changes";

/// What was installed for a feature band at one moment: the active workload
/// set, if any, plus the manifest versions in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadStateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_set_version: Option<String>,
    pub manifests: BTreeMap<ManifestId, String>,
}

/// One persisted history entry. Records are append-only; each lives in its
/// own file so concurrent writers never contend on a shared log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub time_started: u64,
    pub command_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub global_json_version: Option<String>,
    pub state_before_command: WorkloadStateSnapshot,
    pub state_after_command: WorkloadStateSnapshot,
}

/// A reconstructed timeline entry: the state that held after `command_name`
/// ran. Ids are display ordinals for the current read only, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRecord {
    pub id: u64,
    pub time_started: u64,
    pub command_name: String,
    pub global_json_version: Option<String>,
    pub state: WorkloadStateSnapshot,
}

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Append-only record of workload state changes for one feature band.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    layout: StateLayout,
    band: FeatureBand,
}

impl HistoryLedger {
    pub fn new(layout: StateLayout, band: FeatureBand) -> Self {
        Self { layout, band }
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let file_name = format!(
            "{:020}-{}-{nanos}.json",
            record.time_started,
            std::process::id()
        );
        let path = self.layout.history_dir(self.band).join(file_name);
        let contents = serde_json::to_string_pretty(record)
            .context("failed serializing history record")?;
        write_atomic(&path, &contents)
            .with_context(|| format!("failed writing history record: {}", path.display()))
    }

    /// Reads every record in the ledger. A missing directory yields an empty
    /// history; individual unparseable files are skipped so one corrupt
    /// record cannot hide the rest of the timeline.
    pub fn read_all(&self) -> Result<Vec<HistoryRecord>> {
        let dir = self.layout.history_dir(self.band);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read history: {}", dir.display()));
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("failed to read history: {}", dir.display()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(record) = serde_json::from_str::<HistoryRecord>(&raw) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

/// Reconstructs a display timeline from raw records. Records are ordered by
/// start time, a synthetic InitialState entry seeds the timeline, and a
/// synthetic Unlogged Changes entry is inserted wherever a record's
/// before-state disagrees with the previous after-state. Returns the
/// timeline and whether any gap was detected.
pub fn process_history(records: &[HistoryRecord]) -> (Vec<DisplayRecord>, bool) {
    let mut ordered: Vec<&HistoryRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.time_started);

    let mut display = Vec::new();
    let mut gaps_detected = false;

    let Some(first) = ordered.first() else {
        return (display, gaps_detected);
    };

    display.push(DisplayRecord {
        id: 1,
        time_started: 0,
        command_name: INITIAL_STATE_COMMAND.to_string(),
        global_json_version: None,
        state: first.state_before_command.clone(),
    });

    for record in ordered {
        let previous_state = display
            .last()
            .map(|last| last.state.clone())
            .unwrap_or_default();
        if record.state_before_command != previous_state {
            gaps_detected = true;
            display.push(DisplayRecord {
                id: display.len() as u64 + 1,
                time_started: record.time_started,
                command_name: UNLOGGED_CHANGES_COMMAND.to_string(),
                global_json_version: None,
                state: record.state_before_command.clone(),
            });
        }
        display.push(DisplayRecord {
            id: display.len() as u64 + 1,
            time_started: record.time_started,
            command_name: record.command_name.clone(),
            global_json_version: record.global_json_version.clone(),
            state: record.state_after_command.clone(),
        });
    }

    (display, gaps_detected)
}
