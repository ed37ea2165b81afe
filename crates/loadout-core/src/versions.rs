use std::cmp::Ordering;

use anyhow::{anyhow, Context, Result};
use semver::{Prerelease, Version};

/// Total order over workload version strings.
///
/// Textually identical strings are equal. Otherwise the `major.minor.patch`
/// prefixes before the first `-` are compared numerically; on a tie the
/// `-`-delimited suffixes decide, where an absent suffix (a stable release)
/// sorts after any present suffix. Stable `1.2.3` therefore supersedes
/// `1.2.3-preview.1`.
pub fn compare_workload_versions(first: &str, second: &str) -> Result<Ordering> {
    if first == second {
        return Ok(Ordering::Equal);
    }

    let (first_core, first_suffix) = split_at_suffix(first);
    let (second_core, second_suffix) = split_at_suffix(second);

    let first_triple =
        parse_triple(first_core).with_context(|| format!("invalid workload version: '{first}'"))?;
    let second_triple = parse_triple(second_core)
        .with_context(|| format!("invalid workload version: '{second}'"))?;

    let ordering = first_triple.cmp(&second_triple);
    if ordering != Ordering::Equal {
        return Ok(ordering);
    }

    match (first_suffix, second_suffix) {
        (None, None) => Ok(Ordering::Equal),
        (None, Some(_)) => Ok(Ordering::Greater),
        (Some(_), None) => Ok(Ordering::Less),
        (Some(left), Some(right)) => compare_suffixes(left, right),
    }
}

pub fn is_workload_version(value: &str) -> bool {
    parse_triple(split_at_suffix(value).0).is_ok()
}

/// Picks the highest version from an iterator, or `None` when it is empty.
pub fn max_workload_version<'a>(
    versions: impl IntoIterator<Item = &'a str>,
) -> Result<Option<&'a str>> {
    let mut best: Option<&'a str> = None;
    for candidate in versions {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                if compare_workload_versions(candidate, current)? == Ordering::Greater {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    Ok(best)
}

fn split_at_suffix(value: &str) -> (&str, Option<&str>) {
    match value.split_once('-') {
        Some((core, suffix)) => (core, Some(suffix)),
        None => (value, None),
    }
}

fn parse_triple(core: &str) -> Result<(u64, u64, u64)> {
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!(
            "expected three dot-separated numeric components, found {}",
            parts.len()
        ));
    }

    let parse = |part: &str| {
        part.parse::<u64>()
            .with_context(|| format!("invalid numeric version component: '{part}'"))
    };
    Ok((parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
}

fn compare_suffixes(first: &str, second: &str) -> Result<Ordering> {
    // Semver prerelease precedence on a fixed numeric base decides suffix
    // ordering; only the suffixes differ between the two sides.
    let with_suffix = |suffix: &str| -> Result<Version> {
        let mut version = Version::new(1, 1, 1);
        version.pre = Prerelease::new(suffix)
            .with_context(|| format!("invalid prerelease suffix: '{suffix}'"))?;
        Ok(version)
    };

    Ok(with_suffix(first)?.cmp(&with_suffix(second)?))
}
