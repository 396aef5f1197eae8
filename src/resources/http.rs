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
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ResourceError, Response, Transport};

const USER_AGENT: &str = concat!("mcsounds/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches resources over HTTP(S).
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a new HTTP transport.
    pub fn new() -> Result<HttpTransport, ResourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResourceError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(HttpTransport { client })
    }
}

fn request_error(url: &str, e: reqwest::Error) -> ResourceError {
    ResourceError::Request {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Response, ResourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(url, e))?
            .to_vec();

        debug!(url, status, bytes = body.len(), "HTTP response");
        Ok(Response { status, body })
    }
}
