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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use tokio::sync::mpsc::UnboundedSender;

use crate::config::Settings;
use crate::resources::ResourceResolver;
use crate::unit::UnitId;

pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;

/// How long sounds "play" on the mock backend outside of tests.
const MOCK_PLAY_DURATION: Duration = Duration::from_millis(250);

/// Playback parameters applied to a player.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerSettings {
    /// Playback rate. Changes pitch and speed together.
    pub rate: f32,
    /// Linear gain between 0 and 1.
    pub volume: f32,
}

/// A request to create a player for a single audio resource.
#[derive(Clone, Debug)]
pub struct PlayerRequest {
    pub url: String,
    pub settings: PlayerSettings,
}

/// What happened to a player.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEventKind {
    /// The audio has been fetched and decoded and can start immediately.
    Buffered,
    /// Playback reached the end on its own. Never sent as a result of `stop`.
    Ended,
    /// The audio could not be fetched or decoded.
    Failed(String),
}

/// An event from a player, tagged with the unit generation that created it so that
/// events from discarded players can be recognized.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerEvent {
    pub unit: UnitId,
    pub generation: u64,
    pub player: usize,
    pub kind: PlayerEventKind,
}

/// Delivers events for one player back to its owning unit.
#[derive(Clone, Debug)]
pub struct PlayerNotifier {
    unit: UnitId,
    generation: u64,
    player: usize,
    events_tx: UnboundedSender<PlayerEvent>,
}

impl PlayerNotifier {
    pub fn new(
        unit: UnitId,
        generation: u64,
        player: usize,
        events_tx: UnboundedSender<PlayerEvent>,
    ) -> PlayerNotifier {
        PlayerNotifier {
            unit,
            generation,
            player,
            events_tx,
        }
    }

    fn send(&self, kind: PlayerEventKind) {
        // The receiver only goes away when the session is shutting down.
        let _ = self.events_tx.send(PlayerEvent {
            unit: self.unit,
            generation: self.generation,
            player: self.player,
            kind,
        });
    }

    pub fn buffered(&self) {
        self.send(PlayerEventKind::Buffered)
    }

    pub fn ended(&self) {
        self.send(PlayerEventKind::Ended)
    }

    pub fn failed(&self, reason: String) {
        self.send(PlayerEventKind::Failed(reason))
    }
}

/// A handle to one loaded (or loading) audio resource. Dropping it releases the audio.
pub trait Player: Send {
    /// Starts playback from the beginning.
    fn play(&mut self);

    /// Stops playback. Does not produce an `Ended` event.
    fn stop(&mut self);

    fn set_rate(&mut self, rate: f32);

    fn set_volume(&mut self, volume: f32);

    /// Returns true while the player is audible. Cleared by `stop` and by a natural end.
    fn is_playing(&self) -> bool;
}

/// Creates players and owns the audio output they play through.
pub trait Backend: fmt::Display + Send + Sync {
    /// Creates a player for the request. The player reports `Buffered` or `Failed` through
    /// the notifier once loading completes. Events are only observed by the unit on a
    /// later delivery from the session channel.
    fn create_player(&self, request: PlayerRequest, notifier: PlayerNotifier) -> Box<dyn Player>;

    /// Silences every player created by this backend.
    fn stop_all(&self);
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    cpal::Backend::list()
}

/// Gets the backend named in the settings.
pub fn get_backend(
    settings: &Settings,
    resources: Arc<ResourceResolver>,
) -> Result<Arc<dyn Backend>, Box<dyn Error>> {
    let backend = settings.backend();
    if backend.starts_with("mock") {
        return Ok(Arc::new(
            mock::Backend::get(backend).with_play_duration(MOCK_PLAY_DURATION),
        ));
    };
    if backend != "cpal" {
        return Err(format!("unknown audio backend '{}'", backend).into());
    }

    Ok(Arc::new(cpal::Backend::get(
        settings.audio_device(),
        resources,
    )?))
}
