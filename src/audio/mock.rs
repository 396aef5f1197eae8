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
use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::info;

use super::{PlayerNotifier, PlayerRequest};

/// What a mock player has been asked to do.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub url: String,
    pub rate: f32,
    pub volume: f32,
    pub playing: bool,
    /// The number of times the player was started.
    pub plays: usize,
    /// Whether the player handle has been dropped.
    pub released: bool,
}

struct Entry {
    state: PlayerState,
    notifier: PlayerNotifier,
}

#[derive(Default)]
struct State {
    players: Vec<Entry>,
    failing: HashSet<String>,
    stop_all_calls: usize,
}

/// A mock backend. Doesn't actually play anything, but records every player it creates.
#[derive(Clone)]
pub struct Backend {
    name: String,
    /// How long a started player "plays" before it ends on its own. Players never end
    /// on their own if unset.
    play_duration: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            play_duration: None,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Makes started players end on their own after the duration.
    pub fn with_play_duration(mut self, duration: Duration) -> Backend {
        self.play_duration = Some(duration);
        self
    }

    /// Makes players for the URL fail to load.
    #[cfg(test)]
    pub fn fail_url(&self, url: &str) {
        self.state.lock().failing.insert(url.to_string());
    }

    /// A snapshot of every player created so far, in creation order.
    #[cfg(test)]
    pub fn players(&self) -> Vec<PlayerState> {
        self.state
            .lock()
            .players
            .iter()
            .map(|entry| entry.state.clone())
            .collect()
    }

    /// Players that haven't been released yet.
    #[cfg(test)]
    pub fn live_players(&self) -> Vec<PlayerState> {
        self.players()
            .into_iter()
            .filter(|player| !player.released)
            .collect()
    }

    /// Simulates a player reaching the end of its audio.
    #[cfg(test)]
    pub fn finish(&self, index: usize) {
        let mut state = self.state.lock();
        if let Some(entry) = state.players.get_mut(index) {
            if entry.state.playing {
                entry.state.playing = false;
                entry.notifier.ended();
            }
        }
    }

    /// The number of times `stop_all` was called.
    #[cfg(test)]
    pub fn stop_all_calls(&self) -> usize {
        self.state.lock().stop_all_calls
    }
}

impl super::Backend for Backend {
    fn create_player(
        &self,
        request: PlayerRequest,
        notifier: PlayerNotifier,
    ) -> Box<dyn super::Player> {
        let mut state = self.state.lock();
        let index = state.players.len();
        if state.failing.contains(&request.url) {
            notifier.failed(format!("{} is unavailable", request.url));
        } else {
            notifier.buffered();
        }
        state.players.push(Entry {
            state: PlayerState {
                url: request.url,
                rate: request.settings.rate,
                volume: request.settings.volume,
                playing: false,
                plays: 0,
                released: false,
            },
            notifier,
        });

        Box::new(Player {
            index,
            play_duration: self.play_duration,
            state: self.state.clone(),
        })
    }

    fn stop_all(&self) {
        let mut state = self.state.lock();
        state.stop_all_calls += 1;
        for entry in state.players.iter_mut() {
            entry.state.playing = false;
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

struct Player {
    index: usize,
    play_duration: Option<Duration>,
    state: Arc<Mutex<State>>,
}

impl Player {
    fn update(&self, update: impl FnOnce(&mut PlayerState)) {
        if let Some(entry) = self.state.lock().players.get_mut(self.index) {
            update(&mut entry.state);
        }
    }
}

impl super::Player for Player {
    fn play(&mut self) {
        let mut plays = 0;
        self.update(|state| {
            state.playing = true;
            state.plays += 1;
            plays = state.plays;
        });
        info!(player = self.index, "Playing (mock)");

        if let Some(duration) = self.play_duration {
            let state = self.state.clone();
            let index = self.index;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let mut state = state.lock();
                if let Some(entry) = state.players.get_mut(index) {
                    // Only end the play that started this timer.
                    if entry.state.playing && entry.state.plays == plays {
                        entry.state.playing = false;
                        entry.notifier.ended();
                    }
                }
            });
        }
    }

    fn stop(&mut self) {
        self.update(|state| state.playing = false);
    }

    fn set_rate(&mut self, rate: f32) {
        self.update(|state| state.rate = rate);
    }

    fn set_volume(&mut self, volume: f32) {
        self.update(|state| state.volume = volume);
    }

    fn is_playing(&self) -> bool {
        self.state
            .lock()
            .players
            .get(self.index)
            .map(|entry| entry.state.playing)
            .unwrap_or(false)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.update(|state| {
            state.playing = false;
            state.released = true;
        });
    }
}
