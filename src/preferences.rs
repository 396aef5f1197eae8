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
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::manifest::VersionSelector;

const VERSION_FILE: &str = "version";

/// Small pieces of state remembered between runs.
pub struct Preferences {
    dir: PathBuf,
}

impl Preferences {
    pub fn new(dir: &Path) -> Preferences {
        Preferences {
            dir: dir.to_path_buf(),
        }
    }

    /// The per-user preferences directory, if the platform has one.
    pub fn default_location() -> Option<Preferences> {
        dirs::config_dir().map(|dir| Preferences::new(&dir.join(env!("CARGO_PKG_NAME"))))
    }

    /// The stored version id, if there is a readable one.
    pub fn version(&self) -> Option<String> {
        let path = self.dir.join(VERSION_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let version = contents.trim();
                if version.is_empty() {
                    None
                } else {
                    Some(version.to_string())
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = ?path, err = %e, "Unable to read version preference");
                None
            }
        }
    }

    /// The stored version, falling back to the latest snapshot.
    pub fn version_or_default(&self) -> VersionSelector {
        self.version()
            .and_then(|version| version.parse().ok())
            .unwrap_or_default()
    }

    /// Remembers the version id for the next run.
    pub fn set_version(&self, version: &str) -> Result<(), io::Error> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(VERSION_FILE), format!("{}\n", version.trim()))?;
        debug!(version, "Saved version preference");
        Ok(())
    }
}
