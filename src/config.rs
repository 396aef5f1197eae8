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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use duration_string::DurationString;
use serde::Deserialize;

mod error;

pub use error::ConfigError;

const DEFAULT_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";
const DEFAULT_RESOURCE_BASE: &str = "https://resources.download.minecraft.net";
const DEFAULT_LINK_BASE: &str = "https://misode.github.io/sounds/";
const DEFAULT_TICK: &str = "50ms";
const DEFAULT_BACKEND: &str = "cpal";

/// Environment variables with this prefix override file settings, e.g. `MCSOUNDS_TICK`.
const ENV_PREFIX: &str = "MCSOUNDS";

/// Application settings, layered from defaults, an optional YAML file and the
/// environment.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    /// Where the version manifest is fetched from.
    manifest_url: String,

    /// The host that serves content-addressed resources.
    resource_base: String,

    /// Prepended to every resource URL when set.
    resource_proxy: Option<String>,

    /// Whether downloaded resources are cached on disk.
    cache: bool,

    /// Overrides the default cache directory.
    cache_dir: Option<String>,

    /// The length of one offset tick.
    tick: String,

    /// The audio backend: "cpal", or anything starting with "mock".
    backend: String,

    /// The output device name. The default device is used when unset.
    audio_device: Option<String>,

    /// The version to load. Overrides the remembered preference.
    version: Option<String>,

    /// The page that share links point at.
    link_base: String,
}

impl Settings {
    /// Loads settings, reading the YAML file if one is given.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder()
            .set_default("manifest_url", DEFAULT_MANIFEST_URL)?
            .set_default("resource_base", DEFAULT_RESOURCE_BASE)?
            .set_default("cache", true)?
            .set_default("tick", DEFAULT_TICK)?
            .set_default("backend", DEFAULT_BACKEND)?
            .set_default("link_base", DEFAULT_LINK_BASE)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        Ok(builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// Returns these settings with the disk cache turned off.
    pub fn without_cache(mut self) -> Settings {
        self.cache = false;
        self
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    pub fn resource_base(&self) -> &str {
        &self.resource_base
    }

    pub fn resource_proxy(&self) -> Option<&str> {
        self.resource_proxy.as_deref()
    }

    /// The cache directory, or None if caching is disabled or there's nowhere to put it.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if !self.cache {
            return None;
        }
        match &self.cache_dir {
            Some(cache_dir) => Some(PathBuf::from(cache_dir)),
            None => dirs::cache_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME"))),
        }
    }

    /// Returns the offset tick duration.
    pub fn tick(&self) -> Result<Duration, ConfigError> {
        Ok(DurationString::from_string(self.tick.clone())
            .map_err(|e| ConfigError::Duration {
                key: "tick",
                reason: e.to_string(),
            })?
            .into())
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn link_base(&self) -> &str {
        &self.link_base
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(DEFAULT_MANIFEST_URL, settings.manifest_url());
        assert_eq!(DEFAULT_RESOURCE_BASE, settings.resource_base());
        assert_eq!(None, settings.resource_proxy());
        assert_eq!(Duration::from_millis(50), settings.tick().unwrap());
        assert_eq!("cpal", settings.backend());
        assert_eq!(None, settings.audio_device());
        assert_eq!(None, settings.version());
        assert_eq!(None, settings.without_cache().cache_dir());
    }

    #[test]
    #[serial]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcsounds.yaml");
        std::fs::write(
            &path,
            r#"
            resource_proxy: https://proxy.example.net
            cache: false
            tick: 1s
            backend: mock-device
            version: 1.21.4
            "#,
        )
        .unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(Some("https://proxy.example.net"), settings.resource_proxy());
        assert_eq!(None, settings.cache_dir());
        assert_eq!(Duration::from_secs(1), settings.tick().unwrap());
        assert_eq!("mock-device", settings.backend());
        assert_eq!(Some("1.21.4"), settings.version());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        std::env::set_var("MCSOUNDS_TICK", "20ms");
        std::env::set_var("MCSOUNDS_CACHE_DIR", "/tmp/mcsounds-cache");
        let settings = Settings::load(None);
        std::env::remove_var("MCSOUNDS_TICK");
        std::env::remove_var("MCSOUNDS_CACHE_DIR");

        let settings = settings.unwrap();
        assert_eq!(Duration::from_millis(20), settings.tick().unwrap());
        assert_eq!(
            Some(PathBuf::from("/tmp/mcsounds-cache")),
            settings.cache_dir()
        );
    }

    #[test]
    #[serial]
    fn test_invalid_tick() {
        std::env::set_var("MCSOUNDS_TICK", "soon");
        let settings = Settings::load(None);
        std::env::remove_var("MCSOUNDS_TICK");

        assert!(matches!(
            settings.unwrap().tick(),
            Err(ConfigError::Duration { key: "tick", .. })
        ));
    }
}
