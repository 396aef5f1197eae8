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

//! Content-addressed resource resolution.
//!
//! Game assets are addressed by hash. A hash maps to a download URL by sharding on its
//! first two hex characters, and downloads go through a URL-keyed response cache so that
//! a resource is only fetched from the network once.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

mod cache;
mod http;

pub use cache::{DiskCache, MemoryCache, ResponseCache};
pub use http::HttpTransport;

/// Errors that can occur while fetching a resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("cache error for {url}: {source}")]
    Cache {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A fetched response. Failed responses are kept too so that the cache can store them
/// as-is, the same way a browser cache would.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a successful response with the given body.
    pub fn ok(body: Vec<u8>) -> Response {
        Response { status: 200, body }
    }

    /// Returns true if the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The network side of resource fetching.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs a GET request for the given URL.
    async fn get(&self, url: &str) -> Result<Response, ResourceError>;
}

/// Computes the canonical download URL for a content hash.
pub fn resource_url(base: &str, hash: &str) -> String {
    let shard = hash.get(..2).unwrap_or(hash);
    format!("{}/{}/{}", base.trim_end_matches('/'), shard, hash)
}

/// Resolves content hashes to URLs and fetches them through the response cache.
pub struct ResourceResolver {
    /// The resource host, e.g. https://resources.download.minecraft.net.
    base: String,
    /// An optional proxy prefix that is prepended to every resource URL.
    proxy: Option<String>,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ResponseCache>,
}

impl ResourceResolver {
    /// Creates a new resolver.
    pub fn new(
        base: &str,
        proxy: Option<String>,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn ResponseCache>,
    ) -> ResourceResolver {
        ResourceResolver {
            base: base.to_string(),
            proxy,
            transport,
            cache,
        }
    }

    /// Resolves a hash into the URL its resource is downloaded from. Performs no I/O.
    pub fn resolve(&self, hash: &str) -> String {
        let url = resource_url(&self.base, hash);
        match &self.proxy {
            Some(proxy) => format!("{}/{}", proxy.trim_end_matches('/'), url),
            None => url,
        }
    }

    /// Fetches the resource for the given hash.
    pub async fn fetch_hash(&self, hash: &str) -> Result<Vec<u8>, ResourceError> {
        self.fetch(&self.resolve(hash)).await
    }

    /// Fetches the given URL, preferring a successful cached response. Misses and failed
    /// cached responses go to the network, and whatever comes back is stored under the URL.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        match self.cache.get(url).await {
            Ok(Some(response)) if response.is_success() => {
                debug!(url, bytes = response.body.len(), "Serving resource from cache");
                return Ok(response.body);
            }
            Ok(Some(response)) => {
                debug!(url, status = response.status, "Ignoring failed cached response");
            }
            Ok(None) => {}
            Err(e) => warn!(url, err = %e, "Unable to read from cache"),
        }

        info!(url, "Fetching resource");
        let response = self.transport.get(url).await?;
        self.cache.put(url, &response).await?;

        if !response.is_success() {
            return Err(ResourceError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    /// Fetches and parses a JSON document without caching it. Used for the manifest and
    /// other documents that change between releases.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResourceError> {
        let response = self.transport.get(url).await?;
        if !response.is_success() {
            return Err(ResourceError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        parse_json(url, &response.body)
    }
}

/// Parses a JSON body, attributing failures to the URL it came from.
pub fn parse_json<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ResourceError> {
    serde_json::from_slice(body).map_err(|source| ResourceError::Json {
        url: url.to_string(),
        source,
    })
}
