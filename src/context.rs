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
use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{ResolveError, SoundCatalog};
use crate::manifest::{AssetIndex, VersionDocument, VersionManifest, VersionSelector, SOUNDS_JSON};
use crate::resources::{ResourceError, ResourceResolver};

/// Errors that prevent the application context from loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("version '{0}' is not in the manifest")]
    UnknownVersion(String),

    #[error("the asset index has no entry for {0}")]
    MissingCatalog(&'static str),
}

/// A sound entry resolved down to its downloadable resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSound {
    /// The entry's extensionless sound path.
    pub path: String,
    /// The content hash from the asset index.
    pub hash: String,
    /// The URL the audio is downloaded from.
    pub url: String,
}

/// Everything loaded at startup. Units are only created once this is fully populated.
pub struct AppContext {
    version: String,
    assets: AssetIndex,
    catalog: SoundCatalog,
    resources: Arc<ResourceResolver>,
}

/// Fetches the version manifest.
pub async fn load_manifest(
    resources: &ResourceResolver,
    manifest_url: &str,
) -> Result<VersionManifest, LoadError> {
    Ok(resources.get_json(manifest_url).await?)
}

impl AppContext {
    /// Creates a context from already-loaded parts.
    pub fn new(
        version: &str,
        assets: AssetIndex,
        catalog: SoundCatalog,
        resources: Arc<ResourceResolver>,
    ) -> AppContext {
        AppContext {
            version: version.to_string(),
            assets,
            catalog,
            resources,
        }
    }

    /// Loads the manifest, the selected version, its asset index and the sound catalog,
    /// in that order. Any failure here is fatal, since nothing can play without a catalog.
    pub async fn load(
        resources: Arc<ResourceResolver>,
        manifest_url: &str,
        selector: &VersionSelector,
    ) -> Result<AppContext, LoadError> {
        let manifest = load_manifest(&resources, manifest_url).await?;
        let version = manifest
            .select(selector)
            .ok_or_else(|| LoadError::UnknownVersion(selector.to_string()))?;
        info!(version = %version, "Selected version");

        let document: VersionDocument = resources.get_json(&version.url).await?;
        let assets: AssetIndex = resources.get_json(&document.asset_index.url).await?;
        info!(objects = assets.objects.len(), "Loaded asset index");

        let sounds_hash = assets
            .hash(SOUNDS_JSON)
            .ok_or(LoadError::MissingCatalog(SOUNDS_JSON))?;
        let body = resources.fetch_hash(sounds_hash).await?;
        let catalog = SoundCatalog::from_slice(&body).map_err(|source| ResourceError::Json {
            url: resources.resolve(sounds_hash),
            source,
        })?;
        if catalog.is_empty() {
            warn!(version = %version.id, "Sound catalog has no events");
        }
        info!(
            events = catalog.len(),
            playable = catalog.playable_names().count(),
            "Loaded sound catalog"
        );

        Ok(AppContext::new(&version.id, assets, catalog, resources))
    }

    /// The id of the loaded version.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    pub fn resources(&self) -> &Arc<ResourceResolver> {
        &self.resources
    }

    /// Resolves a sound event name into one downloadable resource per variation.
    pub fn resolve(&self, name: &str) -> Result<Vec<ResolvedSound>, ResolveError> {
        self.catalog
            .expand(name)?
            .into_iter()
            .map(|entry| {
                let asset_path = AssetIndex::sound_path(entry.name());
                let hash = self
                    .assets
                    .hash(&asset_path)
                    .ok_or(ResolveError::MissingAsset(asset_path))?;
                Ok(ResolvedSound {
                    path: entry.name().to_string(),
                    hash: hash.to_string(),
                    url: self.resources.resolve(hash),
                })
            })
            .collect()
    }
}
