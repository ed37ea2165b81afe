use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::*;

fn band(value: &str) -> FeatureBand {
    value.parse().expect("valid feature band")
}

#[test]
fn feature_band_rounds_down_to_hundred_block() {
    assert_eq!(band("8.0.201").to_string(), "8.0.200");
    assert_eq!(band("8.0.299").to_string(), "8.0.200");
    assert_eq!(band("8.0.100").to_string(), "8.0.100");
    assert_eq!(band("9.0.0").to_string(), "9.0.0");
}

#[test]
fn feature_band_ignores_prerelease_of_full_sdk_version() {
    assert_eq!(band("8.0.201-preview.3"), band("8.0.200"));
    assert_eq!(band("8.0.100-rc.2.24474.11"), band("8.0.100"));
}

#[test]
fn feature_band_orders_on_triple() {
    assert!(band("8.0.100") < band("8.0.200"));
    assert!(band("8.0.300") < band("9.0.100"));
    assert_eq!(band("8.0.204"), band("8.0.217"));
}

#[test]
fn feature_band_rejects_malformed_input() {
    assert!("not-a-version".parse::<FeatureBand>().is_err());
    assert!("8.0".parse::<FeatureBand>().is_err());
}

#[test]
fn version_ordering_is_total_over_well_formed_pairs() {
    let pairs = [
        ("1.2.3", "1.2.4", Ordering::Less),
        ("1.2.3", "1.2.3", Ordering::Equal),
        ("2.0.0", "1.9.9", Ordering::Greater),
        ("1.10.0", "1.9.0", Ordering::Greater),
    ];
    for (left, right, expected) in pairs {
        let forward = compare_workload_versions(left, right).expect("must compare");
        assert_eq!(forward, expected, "{left} vs {right}");
        let backward = compare_workload_versions(right, left).expect("must compare");
        assert_eq!(backward, expected.reverse(), "{right} vs {left}");
    }
}

#[test]
fn release_supersedes_prerelease_of_same_triple() {
    assert_eq!(
        compare_workload_versions("1.2.3", "1.2.3-preview.1").expect("must compare"),
        Ordering::Greater
    );
    assert_eq!(
        compare_workload_versions("1.2.3-preview.1", "1.2.3").expect("must compare"),
        Ordering::Less
    );
}

#[test]
fn prerelease_suffixes_compare_with_semver_precedence() {
    assert_eq!(
        compare_workload_versions("1.2.3-preview.1", "1.2.3-preview.2").expect("must compare"),
        Ordering::Less
    );
    assert_eq!(
        compare_workload_versions("1.2.3-rc.1", "1.2.3-preview.7").expect("must compare"),
        Ordering::Greater
    );
}

#[test]
fn version_ordering_rejects_malformed_prefix() {
    assert!(compare_workload_versions("1.2", "1.2.3").is_err());
    assert!(compare_workload_versions("1.2.3", "1.2.x").is_err());
    assert!(compare_workload_versions("1.2.3.4", "1.2.3").is_err());
}

#[test]
fn max_workload_version_picks_highest() {
    let versions = ["8.0.201", "8.0.203-preview.2", "8.0.203"];
    let max = max_workload_version(versions).expect("must compare");
    assert_eq!(max, Some("8.0.203"));
    assert_eq!(
        max_workload_version(std::iter::empty()).expect("must compare"),
        None
    );
}

#[test]
fn manifest_id_identity_is_case_insensitive() {
    let lower = ManifestId::new("microsoft.net.sdk.android");
    let shouty = ManifestId::new("Microsoft.NET.Sdk.Android");
    assert_eq!(lower, shouty);
    assert_eq!(lower.cmp(&shouty), Ordering::Equal);

    let mut map = BTreeMap::new();
    map.insert(lower, "34.0.0");
    assert!(map.contains_key(&shouty));
    assert_eq!(map.len(), 1);
}

#[test]
fn manifest_id_preserves_original_spelling() {
    let id = ManifestId::new("Microsoft.NET.Sdk.iOS");
    assert_eq!(id.to_string(), "Microsoft.NET.Sdk.iOS");
}

#[test]
fn manifest_version_parses_band_qualified_form() {
    let parsed = ManifestVersion::parse("34.0.0/8.0.100", band("8.0.200")).expect("must parse");
    assert_eq!(parsed.version, "34.0.0");
    assert_eq!(parsed.feature_band, band("8.0.100"));
}

#[test]
fn manifest_version_bare_form_inherits_default_band() {
    let parsed = ManifestVersion::parse("34.0.0", band("8.0.200")).expect("must parse");
    assert_eq!(parsed.version, "34.0.0");
    assert_eq!(parsed.feature_band, band("8.0.200"));
}

#[test]
fn workload_set_from_json_map() {
    let mut entries = BTreeMap::new();
    entries.insert("microsoft.net.sdk.android".to_string(), "34.0.0/8.0.100".to_string());
    entries.insert("microsoft.net.sdk.ios".to_string(), "17.2.0".to_string());

    let set =
        WorkloadSet::from_json_map("8.0.201", &entries, band("8.0.200")).expect("must build set");
    assert_eq!(set.version, "8.0.201");
    assert_eq!(set.feature_band().expect("must derive band"), band("8.0.200"));
    assert_eq!(
        set.manifests
            .get(&ManifestId::new("Microsoft.NET.Sdk.Android"))
            .expect("android entry")
            .feature_band,
        band("8.0.100")
    );
    assert_eq!(
        set.manifests
            .get(&ManifestId::new("microsoft.net.sdk.ios"))
            .expect("ios entry")
            .feature_band,
        band("8.0.200")
    );
}

#[test]
fn loose_workload_version_is_stable_and_order_independent() {
    let record = |id: &str, version: &str| ManifestRecord {
        id: ManifestId::new(id),
        version: version.to_string(),
        feature_band: band("8.0.200"),
        path: PathBuf::from("/unused"),
    };

    let forward = vec![record("android", "34.0.0"), record("ios", "17.2.0")];
    let reversed = vec![record("ios", "17.2.0"), record("android", "34.0.0")];

    let first = loose_workload_version(band("8.0.200"), &forward);
    let second = loose_workload_version(band("8.0.200"), &reversed);
    assert_eq!(first, second);
    assert!(first.starts_with("8.0.200-manifests."), "got {first}");
    assert_eq!(first.len(), "8.0.200-manifests.".len() + 8);
}

#[test]
fn loose_workload_version_changes_when_manifest_version_changes() {
    let record = |version: &str| ManifestRecord {
        id: ManifestId::new("android"),
        version: version.to_string(),
        feature_band: band("8.0.200"),
        path: PathBuf::from("/unused"),
    };

    let old = loose_workload_version(band("8.0.200"), &[record("34.0.0")]);
    let new = loose_workload_version(band("8.0.200"), &[record("34.0.1")]);
    assert_ne!(old, new);
}
