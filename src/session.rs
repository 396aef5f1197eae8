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
use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::audio::{Backend, PlayerEvent};
use crate::context::AppContext;
use crate::scheduler::{PlaybackScheduler, ScheduledStart};
use crate::unit::{SoundPlaybackUnit, UnitId};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no sound with id {0}")]
    UnknownUnit(UnitId),
}

/// Something that happened outside the session that it needs to react to.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Player(PlayerEvent),
    Start(ScheduledStart),
}

/// The set of units being auditioned. All unit and scheduler state is changed through
/// the session, from a single task.
pub struct Session {
    context: Arc<AppContext>,
    backend: Arc<dyn Backend>,
    scheduler: PlaybackScheduler,
    /// Newest first.
    units: Vec<SoundPlaybackUnit>,
    next_id: u64,
    player_tx: UnboundedSender<PlayerEvent>,
    player_rx: UnboundedReceiver<PlayerEvent>,
    start_rx: UnboundedReceiver<ScheduledStart>,
}

impl Session {
    pub fn new(context: Arc<AppContext>, backend: Arc<dyn Backend>, tick: Duration) -> Session {
        let (player_tx, player_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = mpsc::unbounded_channel();
        Session {
            context,
            backend,
            scheduler: PlaybackScheduler::new(tick, start_tx),
            units: Vec::new(),
            next_id: 1,
            player_tx,
            player_rx,
            start_rx,
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Adds a unit for the sound event at the front of the session.
    pub fn add_unit(&mut self, name: &str, pitch: f32, volume: f32) -> UnitId {
        let id = UnitId::new(self.next_id);
        self.next_id += 1;
        let unit = SoundPlaybackUnit::new(
            id,
            name,
            pitch,
            volume,
            &self.context,
            self.backend.as_ref(),
            self.player_tx.clone(),
        );
        info!(unit = %id, sound = name, "Added sound");
        self.units.insert(0, unit);
        id
    }

    /// Removes a unit, releasing its players.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<(), SessionError> {
        let index = self
            .units
            .iter()
            .position(|unit| unit.id() == id)
            .ok_or(SessionError::UnknownUnit(id))?;
        let mut unit = self.units.remove(index);
        unit.stop();
        info!(unit = %id, sound = unit.name(), "Removed sound");
        Ok(())
    }

    pub fn unit(&self, id: UnitId) -> Option<&SoundPlaybackUnit> {
        self.units.iter().find(|unit| unit.id() == id)
    }

    fn unit_mut(&mut self, id: UnitId) -> Result<&mut SoundPlaybackUnit, SessionError> {
        self.units
            .iter_mut()
            .find(|unit| unit.id() == id)
            .ok_or(SessionError::UnknownUnit(id))
    }

    pub fn units(&self) -> &[SoundPlaybackUnit] {
        &self.units
    }

    pub fn select(&mut self, id: UnitId, name: &str) -> Result<(), SessionError> {
        let context = self.context.clone();
        let backend = self.backend.clone();
        self.unit_mut(id)?.select(name, &context, backend.as_ref());
        Ok(())
    }

    pub fn set_pitch(&mut self, id: UnitId, pitch: f32) -> Result<(), SessionError> {
        self.unit_mut(id)?.set_pitch(pitch);
        Ok(())
    }

    pub fn set_volume(&mut self, id: UnitId, volume: f32) -> Result<(), SessionError> {
        self.unit_mut(id)?.set_volume(volume);
        Ok(())
    }

    pub fn set_offset(&mut self, id: UnitId, offset: u32) -> Result<(), SessionError> {
        self.unit_mut(id)?.set_offset(offset);
        Ok(())
    }

    /// Plays the unit. Returns false if the unit wasn't ready to play.
    pub fn play(&mut self, id: UnitId) -> Result<bool, SessionError> {
        Ok(self.unit_mut(id)?.play())
    }

    pub fn stop(&mut self, id: UnitId) -> Result<(), SessionError> {
        self.unit_mut(id)?.stop();
        Ok(())
    }

    pub fn play_all(&mut self) {
        self.scheduler
            .play_all(&mut self.units, self.backend.as_ref());
    }

    pub fn stop_all(&mut self) {
        self.scheduler
            .stop_all(&mut self.units, self.backend.as_ref());
    }

    /// Waits for the next player or scheduler event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            Some(event) = self.player_rx.recv() => Some(SessionEvent::Player(event)),
            Some(start) = self.start_rx.recv() => Some(SessionEvent::Start(start)),
            else => None,
        }
    }

    /// Routes an event to the unit it belongs to. Events for removed units are dropped.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Player(event) => match self.unit_mut(event.unit) {
                Ok(unit) => unit.handle_event(&event),
                Err(_) => debug!(unit = %event.unit, "Dropping event for removed sound"),
            },
            SessionEvent::Start(start) => {
                if !self.scheduler.accepts(&start) {
                    debug!(unit = %start.unit, epoch = start.epoch, "Ignoring cancelled start");
                    return;
                }
                if let Ok(unit) = self.unit_mut(start.unit) {
                    unit.play();
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::audio::{mock, Backend};
    use crate::test;
    use crate::unit::{Status, UnitId};

    use super::{Session, SessionError, SessionEvent};

    const TICK: Duration = Duration::from_millis(50);

    fn session(backend: &mock::Backend) -> Session {
        let backend: Arc<dyn Backend> = Arc::new(backend.clone());
        Session::new(test::context(), backend, TICK)
    }

    /// Handles events until the predicate holds for the session.
    async fn run_until(session: &mut Session, predicate: impl Fn(&Session) -> bool) {
        while !predicate(session) {
            let event = session.next_event().await.unwrap();
            session.handle_event(event);
        }
    }

    #[tokio::test]
    async fn test_units_are_newest_first() {
        let backend = mock::Backend::get("mock");
        let mut session = session(&backend);
        let first = session.add_unit("block.note_block.harp", 1.0, 1.0);
        let second = session.add_unit("entity.cow.ambient", 1.0, 1.0);

        let ids: Vec<UnitId> = session.units().iter().map(|unit| unit.id()).collect();
        assert_eq!(vec![second, first], ids);
    }

    #[tokio::test]
    async fn test_units_load_through_events() {
        let backend = mock::Backend::get("mock");
        let mut session = session(&backend);
        let id = session.add_unit("entity.cow.ambient", 1.0, 1.0);
        assert_eq!(Status::Loading, session.unit(id).unwrap().status());

        run_until(&mut session, |session| {
            session.unit(id).unwrap().status() == Status::Loaded
        })
        .await;
        assert_eq!(3, session.unit(id).unwrap().player_count());
        assert!(session.play(id).unwrap());
    }

    #[tokio::test]
    async fn test_remove_unit_releases_players() {
        let backend = mock::Backend::get("mock");
        let mut session = session(&backend);
        let id = session.add_unit("entity.cow.ambient", 1.0, 1.0);
        session.remove_unit(id).unwrap();

        assert!(session.units().is_empty());
        assert!(backend.players().iter().all(|player| player.released));
        assert_eq!(Err(SessionError::UnknownUnit(id)), session.remove_unit(id));
        assert_eq!(Err(SessionError::UnknownUnit(id)), session.play(id));

        // Buffered events for the removed unit are dropped.
        let event = session.next_event().await.unwrap();
        assert!(matches!(event, SessionEvent::Player(_)));
        session.handle_event(event);
    }

    #[tokio::test]
    async fn test_select_replaces_players() {
        let backend = mock::Backend::get("mock");
        let mut session = session(&backend);
        let id = session.add_unit("entity.cow.ambient", 1.0, 1.0);
        session.select(id, "nope").unwrap();

        let unit = session.unit(id).unwrap();
        assert!(unit.is_invalid());
        assert_eq!("nope", unit.name());
        assert!(backend.live_players().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_all_and_natural_end() {
        let backend = mock::Backend::get("mock").with_play_duration(Duration::from_millis(500));
        let mut session = session(&backend);
        let first = session.add_unit("block.note_block.harp", 1.0, 1.0);
        let second = session.add_unit("entity.cow.ambient", 1.0, 1.0);
        session.set_offset(second, 2).unwrap();
        run_until(&mut session, |session| {
            session
                .units()
                .iter()
                .all(|unit| unit.status() == Status::Loaded)
        })
        .await;

        session.play_all();
        run_until(&mut session, |session| {
            session
                .units()
                .iter()
                .all(|unit| unit.status() == Status::Playing)
        })
        .await;

        // Both play for the mock duration and then end on their own.
        run_until(&mut session, |session| {
            session
                .units()
                .iter()
                .all(|unit| unit.status() == Status::Loaded)
        })
        .await;
        assert_eq!(1, session.unit(first).unwrap().player_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_rejects_queued_starts() {
        let backend = mock::Backend::get("mock");
        let mut session = session(&backend);
        let id = session.add_unit("block.note_block.harp", 1.0, 1.0);
        run_until(&mut session, |session| {
            session.unit(id).unwrap().status() == Status::Loaded
        })
        .await;

        session.play_all();
        tokio::time::sleep(Duration::from_millis(1)).await;
        session.stop_all();

        let event = session.next_event().await.unwrap();
        assert!(matches!(event, SessionEvent::Start(_)));
        session.handle_event(event);
        assert_eq!(Status::Loaded, session.unit(id).unwrap().status());
    }

    #[tokio::test]
    async fn test_eventually_loaded() {
        let backend = mock::Backend::get("mock");
        let session = Arc::new(tokio::sync::Mutex::new(session(&backend)));
        let id = session.lock().await.add_unit("entity.cow.ambient", 1.0, 1.0);

        test::eventually_async(
            || {
                let session = session.clone();
                async move {
                    let mut session = session.lock().await;
                    if let Ok(Some(event)) =
                        tokio::time::timeout(Duration::from_millis(10), session.next_event()).await
                    {
                        session.handle_event(event);
                    }
                    session.unit(id).unwrap().status() == Status::Loaded
                }
            },
            "Sound never finished loading",
        )
        .await;
    }
}
