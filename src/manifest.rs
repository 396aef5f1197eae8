// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The logical asset path of the sound event document.
pub const SOUNDS_JSON: &str = "minecraft/sounds.json";

const LATEST_SNAPSHOT: &str = "latest-snapshot";
const LATEST_RELEASE: &str = "latest-release";

/// The launcher's version manifest.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct VersionManifest {
    pub latest: Latest,
    pub versions: Vec<VersionEntry>,
}

/// The latest release and snapshot ids.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Latest {
    pub release: String,
    pub snapshot: String,
}

/// A single version listed in the manifest.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct VersionEntry {
    pub id: String,
    pub url: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "releaseTime", default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<String>,
}

impl fmt::Display for VersionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{} ({})", self.id, kind),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Selects a version out of the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum VersionSelector {
    #[default]
    LatestSnapshot,
    LatestRelease,
    Id(String),
}

impl FromStr for VersionSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            LATEST_SNAPSHOT | "" => VersionSelector::LatestSnapshot,
            LATEST_RELEASE => VersionSelector::LatestRelease,
            id => VersionSelector::Id(id.to_string()),
        })
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::LatestSnapshot => write!(f, "{}", LATEST_SNAPSHOT),
            VersionSelector::LatestRelease => write!(f, "{}", LATEST_RELEASE),
            VersionSelector::Id(id) => write!(f, "{}", id),
        }
    }
}

impl VersionManifest {
    /// Finds the version entry for the selector.
    pub fn select(&self, selector: &VersionSelector) -> Option<&VersionEntry> {
        let id = match selector {
            VersionSelector::LatestSnapshot => &self.latest.snapshot,
            VersionSelector::LatestRelease => &self.latest.release,
            VersionSelector::Id(id) => id,
        };
        self.versions.iter().find(|version| &version.id == id)
    }
}

/// The per-version document. Only the asset index reference is used.
#[derive(Deserialize, Clone, Debug)]
pub struct VersionDocument {
    #[serde(rename = "assetIndex")]
    pub asset_index: AssetIndexRef,
}

/// Where to find the asset index for a version.
#[derive(Deserialize, Clone, Debug)]
pub struct AssetIndexRef {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
}

/// Maps logical asset paths to content hashes.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
}

/// A single object in the asset index.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetObject {
    pub hash: String,
    #[serde(default)]
    pub size: u64,
}

impl AssetIndex {
    /// Looks up the hash for a logical asset path.
    pub fn hash(&self, path: &str) -> Option<&str> {
        self.objects.get(path).map(|object| object.hash.as_str())
    }

    /// The logical asset path for a sound entry's extensionless path.
    pub fn sound_path(sound: &str) -> String {
        format!("minecraft/sounds/{}.ogg", sound)
    }
}
