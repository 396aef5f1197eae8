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

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, span, Level};

use crate::audio::Backend;
use crate::unit::{SoundPlaybackUnit, UnitId};

/// A delayed start that came due.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledStart {
    pub unit: UnitId,
    /// The scheduler epoch the start was scheduled in.
    pub epoch: u64,
}

/// Starts units after their offsets and cancels pending starts.
///
/// Delayed starts are timer tasks that send a `ScheduledStart` back to the session
/// when they fire. Stopping aborts the tasks and advances the epoch, so a start that
/// was already sent but not yet handled is rejected by `accepts`.
pub struct PlaybackScheduler {
    tick: Duration,
    epoch: u64,
    pending: Vec<JoinHandle<()>>,
    starts_tx: UnboundedSender<ScheduledStart>,
}

impl PlaybackScheduler {
    pub fn new(tick: Duration, starts_tx: UnboundedSender<ScheduledStart>) -> PlaybackScheduler {
        PlaybackScheduler {
            tick,
            epoch: 0,
            pending: Vec::new(),
            starts_tx,
        }
    }

    /// The start delay for the given offset.
    pub fn delay_for(&self, offset: u32) -> Duration {
        self.tick * offset
    }

    /// Stops everything, then schedules each unit to start after its offset. Only the
    /// units passed in are scheduled.
    pub fn play_all(&mut self, units: &mut [SoundPlaybackUnit], backend: &dyn Backend) {
        self.stop_all(units, backend);

        let span = span!(Level::INFO, "play all");
        let _enter = span.enter();

        for unit in units.iter() {
            let delay = self.delay_for(unit.offset());
            let start = ScheduledStart {
                unit: unit.id(),
                epoch: self.epoch,
            };
            let starts_tx = self.starts_tx.clone();
            debug!(unit = %unit.id(), delay = format!("{:?}", delay), "Scheduling start");
            self.pending.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = starts_tx.send(start);
            }));
        }
        info!(units = units.len(), epoch = self.epoch, "Scheduled play all");
    }

    /// Cancels every pending start, stops every unit, then silences the backend as a
    /// final catch-all.
    pub fn stop_all(&mut self, units: &mut [SoundPlaybackUnit], backend: &dyn Backend) {
        self.epoch += 1;
        let cancelled = self.pending.len();
        for handle in self.pending.drain(..) {
            handle.abort();
        }
        for unit in units.iter_mut() {
            unit.stop();
        }
        backend.stop_all();
        debug!(cancelled, epoch = self.epoch, "Stopped all");
    }

    /// Returns true if the start belongs to the current epoch.
    pub fn accepts(&self, start: &ScheduledStart) -> bool {
        start.epoch == self.epoch
    }

    /// The number of scheduled starts that haven't fired yet.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.pending
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use tokio::time::Instant;

    use crate::audio::{mock, PlayerEvent};
    use crate::test;
    use crate::unit::{SoundPlaybackUnit, Status, UnitId};

    use super::{PlaybackScheduler, ScheduledStart};

    const TICK: Duration = Duration::from_millis(50);

    fn units(
        offsets: &[u32],
        backend: &mock::Backend,
    ) -> (Vec<SoundPlaybackUnit>, UnboundedReceiver<PlayerEvent>) {
        let context = test::context();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut units: Vec<SoundPlaybackUnit> = offsets
            .iter()
            .enumerate()
            .map(|(i, offset)| {
                let mut unit = SoundPlaybackUnit::new(
                    UnitId::new(i as u64),
                    "block.note_block.harp",
                    1.0,
                    1.0,
                    &context,
                    backend,
                    tx.clone(),
                );
                unit.set_offset(*offset);
                unit
            })
            .collect();
        while let Ok(event) = rx.try_recv() {
            for unit in units.iter_mut() {
                unit.handle_event(&event);
            }
        }
        (units, rx)
    }

    #[test]
    fn test_delay_for() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scheduler = PlaybackScheduler::new(TICK, tx);
        assert_eq!(Duration::ZERO, scheduler.delay_for(0));
        assert_eq!(Duration::from_millis(100), scheduler.delay_for(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_all_fires_at_offsets() {
        let backend = mock::Backend::get("mock");
        let (mut units, _events) = units(&[0, 2, 1], &backend);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PlaybackScheduler::new(TICK, tx);

        let started = Instant::now();
        scheduler.play_all(&mut units, &backend);
        assert_eq!(3, scheduler.pending());

        let mut fired = Vec::new();
        for _ in 0..3 {
            let start = rx.recv().await.unwrap();
            assert!(scheduler.accepts(&start));
            fired.push((start.unit, started.elapsed()));
        }

        let expected = [
            (UnitId::new(0), Duration::ZERO),
            (UnitId::new(2), Duration::from_millis(50)),
            (UnitId::new(1), Duration::from_millis(100)),
        ];
        for ((unit, elapsed), (expected_unit, expected_delay)) in fired.iter().zip(expected) {
            assert_eq!(expected_unit, *unit);
            // The paused clock lands on the timer's millisecond deadline.
            assert!(
                *elapsed >= expected_delay && *elapsed <= expected_delay + Duration::from_millis(1),
                "unit {} fired after {:?}",
                unit,
                elapsed
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_cancels_pending_starts() {
        let backend = mock::Backend::get("mock");
        let (mut units, _events) = units(&[0, 2, 1], &backend);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PlaybackScheduler::new(TICK, tx);

        scheduler.play_all(&mut units, &backend);
        let start = rx.recv().await.unwrap();
        assert_eq!(UnitId::new(0), start.unit);
        assert!(units[0].play());
        assert_eq!(Status::Playing, units[0].status());

        scheduler.stop_all(&mut units, &backend);
        assert_eq!(0, scheduler.pending());
        assert_eq!(Status::Loaded, units[0].status());
        assert!(backend.players().iter().all(|player| !player.playing));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_start_from_old_epoch_is_rejected() {
        let backend = mock::Backend::get("mock");
        let (mut units, _events) = units(&[0], &backend);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PlaybackScheduler::new(TICK, tx);

        scheduler.play_all(&mut units, &backend);
        tokio::time::sleep(Duration::from_millis(1)).await;
        scheduler.stop_all(&mut units, &backend);

        let start = rx.recv().await.unwrap();
        assert!(!scheduler.accepts(&start));
        assert!(scheduler.accepts(&ScheduledStart {
            unit: start.unit,
            epoch: start.epoch + 1,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_all_stops_first() {
        let backend = mock::Backend::get("mock");
        let (mut units, _events) = units(&[1], &backend);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut scheduler = PlaybackScheduler::new(TICK, tx);

        units[0].play();
        scheduler.play_all(&mut units, &backend);
        assert_eq!(Status::Loaded, units[0].status());
        assert_eq!(1, backend.stop_all_calls());
    }
}
