use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use semver::Version;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The (major, minor, hundred-block) family of SDK releases that share
/// workload compatibility. Patch detail below the hundred block and any
/// prerelease label are dropped: `8.0.201-preview.3` belongs to `8.0.200`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureBand {
    major: u64,
    minor: u64,
    band: u64,
}

impl FeatureBand {
    pub fn from_sdk_version(sdk_version: &str) -> Result<Self> {
        let version = Version::parse(sdk_version.trim())
            .with_context(|| format!("invalid SDK version: '{sdk_version}'"))?;
        Ok(Self {
            major: version.major,
            minor: version.minor,
            band: version.patch - version.patch % 100,
        })
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn band(&self) -> u64 {
        self.band
    }
}

impl fmt::Display for FeatureBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.band)
    }
}

impl FromStr for FeatureBand {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::from_sdk_version(value)
    }
}

impl Serialize for FeatureBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FeatureBand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
