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

//! Shareable links that describe a single sound selection.
//!
//! A link is a URL whose query carries `sound`, and optionally `pitch` and `volume`.
//! Pitch and volume are clamped into range, and fall back to 1 when missing or
//! unparseable.

use crate::unit::{clamp_pitch, clamp_volume, DEFAULT_PITCH, DEFAULT_VOLUME};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link has no sound parameter")]
    MissingSound,

    #[error("invalid encoding in link parameter '{0}'")]
    Encoding(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShareLink {
    pub sound: String,
    pub pitch: f32,
    pub volume: f32,
}

fn decode(value: &str) -> Result<String, LinkError> {
    urlencoding::decode(&value.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| LinkError::Encoding(value.to_string()))
}

impl ShareLink {
    pub fn new(sound: &str, pitch: f32, volume: f32) -> ShareLink {
        ShareLink {
            sound: sound.to_string(),
            pitch: clamp_pitch(pitch),
            volume: clamp_volume(volume),
        }
    }

    /// Parses a full link or a bare query string.
    pub fn parse(link: &str) -> Result<ShareLink, LinkError> {
        let link = link.split('#').next().unwrap_or_default();
        let query = match link.split_once('?') {
            Some((_, query)) => query,
            None => link,
        };

        let mut sound = None;
        let mut pitch = None;
        let mut volume = None;
        for param in query.split('&').filter(|param| !param.is_empty()) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            match key {
                "sound" => sound = Some(decode(value)?),
                "pitch" => pitch = decode(value)?.trim().parse::<f32>().ok(),
                "volume" => volume = decode(value)?.trim().parse::<f32>().ok(),
                _ => {}
            }
        }

        let sound = sound
            .filter(|sound| !sound.is_empty())
            .ok_or(LinkError::MissingSound)?;
        Ok(ShareLink::new(
            &sound,
            pitch.unwrap_or(DEFAULT_PITCH),
            volume.unwrap_or(DEFAULT_VOLUME),
        ))
    }

    /// Builds the link on top of the base URL.
    pub fn to_url(&self, base: &str) -> String {
        let separator = if base.contains('?') { '&' } else { '?' };
        format!(
            "{}{}sound={}&pitch={}&volume={}",
            base,
            separator,
            urlencoding::encode(&self.sound),
            self.pitch,
            self.volume
        )
    }
}
