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
use std::error::Error;
use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::session::Session;
use crate::unit::UnitId;

pub mod keyboard;

/// Controller events that will trigger behavior in the session.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Adds a sound to the top of the session.
    Add { name: String, pitch: f32, volume: f32 },

    /// Changes the sound event of an existing sound.
    Select { id: UnitId, name: String },

    Pitch { id: UnitId, pitch: f32 },

    Volume { id: UnitId, volume: f32 },

    /// Sets the play-all start delay of a sound, in ticks.
    Offset { id: UnitId, ticks: u32 },

    Play(UnitId),

    Stop(UnitId),

    Remove(UnitId),

    /// Starts every sound after its offset.
    PlayAll,

    /// Stops every sound and cancels pending starts.
    StopAll,

    /// Prints the sounds in the session.
    List,

    /// Prints playable sound events containing the filter.
    Search(String),

    /// Prints the share link for a sound.
    Link(UnitId),

    /// Stops the controller.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Drives a session from a driver's events.
pub struct Controller {
    handle: JoinHandle<Session>,
}

impl Controller {
    /// Creates a new controller with the given driver. Share links are built on top of
    /// the link base.
    pub fn new(session: Session, driver: Arc<dyn Driver>, link_base: &str) -> Controller {
        let link_base = link_base.to_string();
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(
                Controller::run(session, driver, link_base).instrument(span),
            ),
        }
    }

    /// Join will block until the controller finishes, returning the session.
    pub async fn join(&mut self) -> Result<Session, JoinError> {
        (&mut self.handle).await
    }

    /// Applies driver events and session events until the driver quits or closes.
    async fn run(mut session: Session, driver: Arc<dyn Driver>, link_base: String) -> Session {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(version = session.context().version(), backend = %session.backend(), "Controller started.");

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(Event::Quit) | None => break,
                    Some(event) => {
                        info!(event = format!("{:?}", event), "Received event.");
                        if let Err(e) = Controller::apply(&mut session, event, &link_base) {
                            error!("Error applying event: {}", e);
                        }
                    }
                },
                Some(event) = session.next_event() => session.handle_event(event),
            }
        }

        info!("Controller closing.");
        session.stop_all();
        match join_handle.await {
            Ok(Err(e)) => error!("Event monitor failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
        session
    }

    fn apply(session: &mut Session, event: Event, link_base: &str) -> Result<(), Box<dyn Error>> {
        match event {
            Event::Add {
                name,
                pitch,
                volume,
            } => {
                let id = session.add_unit(&name, pitch, volume);
                println!("Added {}", id);
            }
            Event::Select { id, name } => session.select(id, &name)?,
            Event::Pitch { id, pitch } => session.set_pitch(id, pitch)?,
            Event::Volume { id, volume } => session.set_volume(id, volume)?,
            Event::Offset { id, ticks } => session.set_offset(id, ticks)?,
            Event::Play(id) => {
                if !session.play(id)? {
                    println!("{} is not ready to play", id);
                }
            }
            Event::Stop(id) => session.stop(id)?,
            Event::Remove(id) => session.remove_unit(id)?,
            Event::PlayAll => session.play_all(),
            Event::StopAll => session.stop_all(),
            Event::List => {
                for unit in session.units() {
                    println!("{}", unit);
                }
            }
            Event::Search(filter) => {
                for name in session.context().catalog().search(&filter) {
                    println!("{}", name);
                }
            }
            Event::Link(id) => {
                let unit = session
                    .unit(id)
                    .ok_or(crate::session::SessionError::UnknownUnit(id))?;
                println!("{}", unit.share_link(link_base));
            }
            Event::Quit => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{io, sync::Arc, time::Duration};

    use tokio::{sync::mpsc::Sender, task::JoinHandle};

    use crate::audio::{mock, Backend};
    use crate::session::Session;
    use crate::test;
    use crate::unit::{Status, UnitId};

    use super::{Controller, Driver, Event};

    /// A driver that sends a fixed script of events, pausing between them so that the
    /// session can process player events.
    struct ScriptedDriver {
        events: parking_lot::Mutex<Vec<Event>>,
    }

    impl ScriptedDriver {
        fn new(events: Vec<Event>) -> ScriptedDriver {
            ScriptedDriver {
                events: parking_lot::Mutex::new(events),
            }
        }
    }

    impl Driver for ScriptedDriver {
        fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
            let events: Vec<Event> = self.events.lock().drain(..).collect();
            tokio::spawn(async move {
                for event in events {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    events_tx
                        .send(event)
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                }
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_controller() {
        let backend = mock::Backend::get("mock");
        let shared: Arc<dyn Backend> = Arc::new(backend.clone());
        let session = Session::new(test::context(), shared, Duration::from_millis(50));

        let driver = Arc::new(ScriptedDriver::new(vec![
            Event::Add {
                name: "block.note_block.harp".to_string(),
                pitch: 1.0,
                volume: 1.0,
            },
            Event::Add {
                name: "entity.cow.ambient".to_string(),
                pitch: 1.0,
                volume: 1.0,
            },
            Event::Pitch {
                id: UnitId::new(2),
                pitch: 3.0,
            },
            Event::Offset {
                id: UnitId::new(2),
                ticks: 4,
            },
            Event::Remove(UnitId::new(1)),
            // Errors are logged and don't stop the controller.
            Event::Play(UnitId::new(1)),
            Event::Play(UnitId::new(2)),
            Event::List,
            Event::Quit,
        ]));
        let mut controller = Controller::new(session, driver, "https://sounds.example.net/");
        let session = controller.join().await.unwrap();

        let ids: Vec<UnitId> = session.units().iter().map(|unit| unit.id()).collect();
        assert_eq!(vec![UnitId::new(2)], ids);
        let unit = session.unit(UnitId::new(2)).unwrap();
        assert_eq!(2.0, unit.pitch());
        assert_eq!(4, unit.offset());
        // Quitting stops everything.
        assert_eq!(Status::Loaded, unit.status());
        assert_eq!(1, backend.players().iter().map(|p| p.plays).sum::<usize>());
        assert!(backend.players().iter().all(|player| !player.playing));
    }
}
