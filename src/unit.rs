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
use std::fmt;

use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, span, warn, Level};

use crate::audio::{
    Backend, Player, PlayerEvent, PlayerEventKind, PlayerNotifier, PlayerRequest, PlayerSettings,
};
use crate::context::AppContext;
use crate::link::ShareLink;

pub const MIN_PITCH: f32 = 0.5;
pub const MAX_PITCH: f32 = 2.0;
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const DEFAULT_PITCH: f32 = 1.0;
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Clamps a pitch multiplier into the playable range. NaN becomes the default.
pub fn clamp_pitch(pitch: f32) -> f32 {
    if pitch.is_nan() {
        return DEFAULT_PITCH;
    }
    pitch.clamp(MIN_PITCH, MAX_PITCH)
}

/// Clamps a volume into [0, 1]. NaN becomes the default.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return DEFAULT_VOLUME;
    }
    volume.clamp(MIN_VOLUME, MAX_VOLUME)
}

/// Identifies a unit within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    pub fn new(id: u64) -> UnitId {
        UnitId(id)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The playback status of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Players have been created but not all of them have buffered.
    Loading,
    /// Ready to play, or has nothing to play if invalid.
    Loaded,
    /// One player is playing.
    Playing,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Status::Loading => "loading",
                Status::Loaded => "loaded",
                Status::Playing => "playing",
            }
        )
    }
}

/// One sound event selection and the players for each of its variations.
///
/// Player events are tagged with the generation that created them. Every selection
/// change or load failure advances the generation, so events from discarded players
/// are ignored.
pub struct SoundPlaybackUnit {
    id: UnitId,
    name: String,
    pitch: f32,
    volume: f32,
    /// Start delay for play-all, in ticks.
    offset: u32,
    status: Status,
    /// Set when the selection has nothing playable.
    invalid: bool,
    generation: u64,
    players: Vec<Box<dyn Player>>,
    buffered: Vec<bool>,
    /// The player started by the last `play`.
    active: Option<usize>,
    events_tx: UnboundedSender<PlayerEvent>,
}

impl SoundPlaybackUnit {
    /// Creates a unit and selects the given sound event.
    pub fn new(
        id: UnitId,
        name: &str,
        pitch: f32,
        volume: f32,
        context: &AppContext,
        backend: &dyn Backend,
        events_tx: UnboundedSender<PlayerEvent>,
    ) -> SoundPlaybackUnit {
        let mut unit = SoundPlaybackUnit {
            id,
            name: String::new(),
            pitch: clamp_pitch(pitch),
            volume: clamp_volume(volume),
            offset: 0,
            status: Status::Loading,
            invalid: false,
            generation: 0,
            players: Vec::new(),
            buffered: Vec::new(),
            active: None,
            events_tx,
        };
        unit.select(name, context, backend);
        unit
    }

    fn settings(&self) -> PlayerSettings {
        PlayerSettings {
            rate: self.pitch,
            volume: self.volume,
        }
    }

    fn release_players(&mut self) {
        self.players.clear();
        self.buffered.clear();
        self.active = None;
    }

    /// Replaces the selection. All existing players are released and one player is
    /// created per resolved variation. A selection that doesn't resolve leaves the unit
    /// loaded, invalid and without players.
    pub fn select(&mut self, name: &str, context: &AppContext, backend: &dyn Backend) {
        let span = span!(Level::INFO, "select", unit = %self.id);
        let _enter = span.enter();

        self.generation += 1;
        self.release_players();
        self.name = name.to_string();

        let sounds = match context.resolve(name) {
            Ok(sounds) => sounds,
            Err(e) => {
                info!(sound = name, err = %e, "Selection is not playable");
                self.invalid = true;
                self.status = Status::Loaded;
                return;
            }
        };

        self.invalid = false;
        self.status = Status::Loading;
        for (index, sound) in sounds.into_iter().enumerate() {
            let notifier =
                PlayerNotifier::new(self.id, self.generation, index, self.events_tx.clone());
            let request = PlayerRequest {
                url: sound.url,
                settings: self.settings(),
            };
            self.players.push(backend.create_player(request, notifier));
            self.buffered.push(false);
        }
        info!(
            sound = name,
            players = self.players.len(),
            generation = self.generation,
            "Loading sound"
        );
    }

    /// Applies a player event. Events from a previous generation are ignored.
    pub fn handle_event(&mut self, event: &PlayerEvent) {
        if event.unit != self.id || event.generation != self.generation {
            debug!(
                unit = %self.id,
                generation = event.generation,
                current = self.generation,
                "Ignoring stale player event"
            );
            return;
        }

        match &event.kind {
            PlayerEventKind::Buffered => {
                if let Some(buffered) = self.buffered.get_mut(event.player) {
                    *buffered = true;
                }
                if self.status == Status::Loading && self.buffered.iter().all(|b| *b) {
                    debug!(unit = %self.id, "All players buffered");
                    self.status = Status::Loaded;
                }
            }
            PlayerEventKind::Ended => {
                // A player restarted since this end was queued is still audible.
                let restarted = self
                    .players
                    .get(event.player)
                    .is_some_and(|player| player.is_playing());
                if restarted {
                    debug!(
                        unit = %self.id,
                        player = event.player,
                        "Ignoring end of replayed player"
                    );
                    return;
                }
                if self.status == Status::Playing && self.active == Some(event.player) {
                    self.active = None;
                    self.status = Status::Loaded;
                }
            }
            PlayerEventKind::Failed(reason) => {
                warn!(unit = %self.id, sound = self.name, reason, "Player failed to load");
                self.generation += 1;
                self.release_players();
                self.invalid = true;
                self.status = Status::Loaded;
            }
        }
    }

    /// Starts one randomly picked variation. Only possible while loaded with at least one
    /// player. Returns true if playback started.
    pub fn play_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if self.status != Status::Loaded || self.players.is_empty() {
            return false;
        }
        let index = rng.gen_range(0..self.players.len());
        self.players[index].play();
        self.active = Some(index);
        self.status = Status::Playing;
        debug!(unit = %self.id, player = index, "Playing");
        true
    }

    pub fn play(&mut self) -> bool {
        self.play_with(&mut rand::thread_rng())
    }

    /// Stops every player. Only does anything while playing.
    pub fn stop(&mut self) {
        if self.status != Status::Playing {
            return;
        }
        for player in self.players.iter_mut() {
            player.stop();
        }
        self.active = None;
        self.status = Status::Loaded;
    }

    /// Sets the pitch on the unit and all of its players.
    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = clamp_pitch(pitch);
        for player in self.players.iter_mut() {
            player.set_rate(self.pitch);
        }
    }

    /// Sets the volume on the unit and all of its players.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
        for player in self.players.iter_mut() {
            player.set_volume(self.volume);
        }
    }

    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// A link that recreates this unit's selection, pitch and volume.
    pub fn share_link(&self, base: &str) -> String {
        ShareLink::new(&self.name, self.pitch, self.volume).to_url(base)
    }
}

impl fmt::Display for SoundPlaybackUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}{}, pitch={:.2}, volume={:.2}, offset={})",
            self.id,
            self.name,
            self.status,
            if self.invalid { ", invalid" } else { "" },
            self.pitch,
            self.volume,
            self.offset
        )
    }
}
