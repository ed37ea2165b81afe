use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use loadout_core::{FeatureBand, ManifestId};

use crate::{
    find_global_json, process_history, write_atomic, workload_version_from_global_json,
    GlobalJsonPinRegistry, HistoryLedger, HistoryRecord, InstallState, InstallStateStore,
    StateLayout, WorkloadSetMode, WorkloadStateSnapshot, INITIAL_STATE_COMMAND,
    UNLOGGED_CHANGES_COMMAND,
};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("must read clock")
        .as_nanos();
    let counter = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let root = std::env::temp_dir().join(format!(
        "loadout-state-{name}-{}-{nanos}-{counter}",
        std::process::id()
    ));
    fs::create_dir_all(&root).expect("must create test root");
    root
}

fn band() -> FeatureBand {
    "9.0.103".parse().expect("must parse band")
}

fn snapshot(set: Option<&str>, manifests: &[(&str, &str)]) -> WorkloadStateSnapshot {
    WorkloadStateSnapshot {
        workload_set_version: set.map(str::to_string),
        manifests: manifests
            .iter()
            .map(|(id, version)| (ManifestId::from(*id), version.to_string()))
            .collect(),
    }
}

fn record(
    time_started: u64,
    command: &str,
    before: WorkloadStateSnapshot,
    after: WorkloadStateSnapshot,
) -> HistoryRecord {
    HistoryRecord {
        time_started,
        command_name: command.to_string(),
        global_json_version: None,
        state_before_command: before,
        state_after_command: after,
    }
}

#[test]
fn missing_install_state_defaults_to_workload_sets() {
    let layout = StateLayout::new(test_root("missing-state"));
    let store = InstallStateStore::new(layout);

    let state = store.load(band());
    assert_eq!(state, InstallState::default());
    assert_eq!(state.mode(), WorkloadSetMode::Unset);
    assert!(state.mode().workload_sets_enabled());
}

#[test]
fn malformed_install_state_defaults_instead_of_failing() {
    let layout = StateLayout::new(test_root("bad-state"));
    let path = layout.install_state_path(band());
    fs::create_dir_all(path.parent().expect("must have parent")).expect("must create dirs");
    fs::write(&path, "{ not json").expect("must write");

    let store = InstallStateStore::new(layout);
    assert_eq!(store.load(band()), InstallState::default());
}

#[test]
fn install_state_update_round_trips() {
    let layout = StateLayout::new(test_root("state-update"));
    let store = InstallStateStore::new(layout);

    let updated = store
        .update(band(), |state| {
            state.use_workload_sets = Some(false);
            state.workload_version = Some("9.103.0".to_string());
        })
        .expect("must update");
    assert_eq!(updated.mode(), WorkloadSetMode::UseLooseManifests);
    assert!(!updated.mode().workload_sets_enabled());

    let reloaded = store.load(band());
    assert_eq!(reloaded, updated);
    assert_eq!(reloaded.workload_version.as_deref(), Some("9.103.0"));
}

#[test]
fn global_json_version_reads_the_sdk_section() {
    let root = test_root("gj-read");
    let path = root.join("global.json");
    fs::write(
        &path,
        r#"{ "sdk": { "version": "9.0.103", "workloadVersion": "9.103.2" } }"#,
    )
    .expect("must write");

    assert_eq!(
        workload_version_from_global_json(&path).as_deref(),
        Some("9.103.2")
    );
}

#[test]
fn global_json_version_is_none_for_broken_or_silent_files() {
    let root = test_root("gj-broken");

    let missing = root.join("absent").join("global.json");
    assert_eq!(workload_version_from_global_json(&missing), None);

    let malformed = root.join("global.json");
    fs::write(&malformed, "{ nope").expect("must write");
    assert_eq!(workload_version_from_global_json(&malformed), None);

    let silent = root.join("silent.json");
    fs::write(&silent, r#"{ "sdk": { "version": "9.0.103" } }"#).expect("must write");
    assert_eq!(workload_version_from_global_json(&silent), None);
}

#[test]
fn find_global_json_walks_up_parent_directories() {
    let root = test_root("gj-walk");
    let nested = root.join("src").join("deep");
    fs::create_dir_all(&nested).expect("must create dirs");
    let global_json = root.join("global.json");
    fs::write(&global_json, "{}").expect("must write");

    assert_eq!(find_global_json(&nested), Some(global_json));
}

#[test]
fn pins_survive_while_the_global_json_still_agrees() {
    let root = test_root("pins-live");
    let layout = StateLayout::new(&root);
    let registry = GlobalJsonPinRegistry::new(layout, band());

    let project = root.join("project");
    fs::create_dir_all(&project).expect("must create dirs");
    let global_json = project.join("global.json");
    fs::write(
        &global_json,
        r#"{ "sdk": { "workloadVersion": "9.103.1" } }"#,
    )
    .expect("must write");

    registry
        .record_pin(&global_json, "9.103.1")
        .expect("must record");

    let live = registry.live_pins().expect("must enumerate");
    assert_eq!(live.len(), 1);
    assert_eq!(live.get(&global_json).map(String::as_str), Some("9.103.1"));
}

#[test]
fn stale_pins_are_pruned_not_updated() {
    let root = test_root("pins-stale");
    let layout = StateLayout::new(&root);
    let registry = GlobalJsonPinRegistry::new(layout, band());

    let project = root.join("project");
    fs::create_dir_all(&project).expect("must create dirs");
    let global_json = project.join("global.json");
    fs::write(
        &global_json,
        r#"{ "sdk": { "workloadVersion": "9.103.1" } }"#,
    )
    .expect("must write");
    registry
        .record_pin(&global_json, "9.103.1")
        .expect("must record");

    // The project moved on to a different set version.
    fs::write(
        &global_json,
        r#"{ "sdk": { "workloadVersion": "9.103.4" } }"#,
    )
    .expect("must rewrite");

    let live = registry.live_pins().expect("must enumerate");
    assert!(live.is_empty());
}

#[test]
fn pins_for_deleted_global_jsons_are_dropped() {
    let root = test_root("pins-deleted");
    let layout = StateLayout::new(&root);
    let registry = GlobalJsonPinRegistry::new(layout, band());

    let global_json = root.join("global.json");
    fs::write(
        &global_json,
        r#"{ "sdk": { "workloadVersion": "9.103.1" } }"#,
    )
    .expect("must write");
    registry
        .record_pin(&global_json, "9.103.1")
        .expect("must record");
    fs::remove_file(&global_json).expect("must remove");

    assert!(registry.live_pins().expect("must enumerate").is_empty());
}

#[test]
fn pin_enumeration_is_idempotent() {
    let root = test_root("pins-idem");
    let layout = StateLayout::new(&root);
    let registry = GlobalJsonPinRegistry::new(layout.clone(), band());

    let kept = root.join("kept-global.json");
    fs::write(&kept, r#"{ "sdk": { "workloadVersion": "9.103.1" } }"#).expect("must write");
    registry.record_pin(&kept, "9.103.1").expect("must record");

    let gone = root.join("gone-global.json");
    fs::write(&gone, r#"{ "sdk": { "workloadVersion": "9.103.2" } }"#).expect("must write");
    registry.record_pin(&gone, "9.103.2").expect("must record");
    fs::remove_file(&gone).expect("must remove");

    let first = registry.live_pins().expect("must enumerate");
    let table_after_first = fs::read_to_string(layout.pin_table_path(band()))
        .expect("must read pin table");
    let second = registry.live_pins().expect("must enumerate again");
    let table_after_second = fs::read_to_string(layout.pin_table_path(band()))
        .expect("must read pin table");

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(table_after_first, table_after_second);
}

#[test]
fn history_append_and_read_round_trip() {
    let layout = StateLayout::new(test_root("history-rt"));
    let ledger = HistoryLedger::new(layout, band());

    let entry = record(
        1_700_000_000,
        "workload install",
        snapshot(None, &[]),
        snapshot(Some("9.103.1"), &[("microsoft.net.workload.mono", "9.0.1")]),
    );
    ledger.append(&entry).expect("must append");

    let records = ledger.read_all().expect("must read");
    assert_eq!(records, vec![entry]);
}

#[test]
fn unparseable_history_files_are_skipped() {
    let layout = StateLayout::new(test_root("history-bad"));
    let ledger = HistoryLedger::new(layout.clone(), band());

    let entry = record(10, "workload update", snapshot(None, &[]), snapshot(Some("9.103.1"), &[]));
    ledger.append(&entry).expect("must append");
    let dir = layout.history_dir(band());
    fs::write(dir.join("00000000000000000005-0-0.json"), "garbage").expect("must write");

    let records = ledger.read_all().expect("must read");
    assert_eq!(records, vec![entry]);
}

#[test]
fn empty_history_reads_as_empty() {
    let layout = StateLayout::new(test_root("history-empty"));
    let ledger = HistoryLedger::new(layout, band());
    assert!(ledger.read_all().expect("must read").is_empty());
    let (display, gaps) = process_history(&[]);
    assert!(display.is_empty());
    assert!(!gaps);
}

#[test]
fn history_timeline_starts_with_initial_state() {
    let before = snapshot(None, &[("a", "1.0.0")]);
    let after = snapshot(Some("9.103.1"), &[("a", "1.0.1")]);
    let records = vec![record(100, "workload install", before.clone(), after.clone())];

    let (display, gaps) = process_history(&records);
    assert!(!gaps);
    assert_eq!(display.len(), 2);
    assert_eq!(display[0].command_name, INITIAL_STATE_COMMAND);
    assert_eq!(display[0].id, 1);
    assert_eq!(display[0].state, before);
    assert_eq!(display[1].command_name, "workload install");
    assert_eq!(display[1].id, 2);
    assert_eq!(display[1].state, after);
}

#[test]
fn history_orders_records_by_start_time() {
    let first = snapshot(None, &[]);
    let second = snapshot(Some("9.103.1"), &[]);
    let third = snapshot(Some("9.103.2"), &[]);
    let records = vec![
        record(200, "workload update", second.clone(), third.clone()),
        record(100, "workload install", first.clone(), second.clone()),
    ];

    let (display, gaps) = process_history(&records);
    assert!(!gaps);
    let commands: Vec<&str> = display
        .iter()
        .map(|entry| entry.command_name.as_str())
        .collect();
    assert_eq!(
        commands,
        vec![INITIAL_STATE_COMMAND, "workload install", "workload update"]
    );
    let ids: Vec<u64> = display.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn history_inserts_unlogged_changes_for_gaps() {
    let first = snapshot(None, &[]);
    let second = snapshot(Some("9.103.1"), &[]);
    let out_of_band = snapshot(Some("9.103.3"), &[]);
    let fourth = snapshot(Some("9.103.4"), &[]);
    let records = vec![
        record(100, "workload install", first, second),
        // Something outside the ledger moved the state to 9.103.3.
        record(300, "workload update", out_of_band.clone(), fourth.clone()),
    ];

    let (display, gaps) = process_history(&records);
    assert!(gaps);
    assert_eq!(display.len(), 4);
    assert_eq!(display[2].command_name, UNLOGGED_CHANGES_COMMAND);
    assert_eq!(display[2].state, out_of_band);
    assert_eq!(display[3].state, fourth);
    let ids: Vec<u64> = display.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn write_atomic_replaces_existing_content() {
    let root = test_root("atomic");
    let path = root.join("nested").join("value.json");

    write_atomic(&path, "first").expect("must write");
    write_atomic(&path, "second").expect("must rewrite");

    assert_eq!(fs::read_to_string(&path).expect("must read"), "second");
    let leftovers: Vec<_> = fs::read_dir(path.parent().expect("must have parent"))
        .expect("must list")
        .map(|entry| entry.expect("must read entry").file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("value.json")]);
}

#[test]
fn install_state_serializes_camel_case_without_empty_fields() {
    let state = InstallState {
        use_workload_sets: Some(true),
        manifests: Some(BTreeMap::from([(
            ManifestId::from("microsoft.net.workload.emscripten"),
            "9.0.1".to_string(),
        )])),
        workload_version: None,
    };

    let json = serde_json::to_string(&state).expect("must serialize");
    assert!(json.contains("\"useWorkloadSets\":true"));
    assert!(json.contains("\"manifests\""));
    assert!(!json.contains("workloadVersion"));
}
