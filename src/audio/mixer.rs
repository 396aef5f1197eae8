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
// Core audio mixing logic that can be used by both CPAL and test implementations
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::decode::DecodedSound;
use super::PlayerNotifier;

/// Global atomic counter for generating unique voice IDs
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// An f32 that can be shared with the audio callback without locking.
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> AtomicF32 {
        AtomicF32(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// One sound in the mixer. Voices are silent until their data is loaded and they are
/// started.
pub struct Voice {
    id: u64,
    data: RwLock<Option<Arc<DecodedSound>>>,
    /// Playback position in source frames. Fractional when the rate isn't 1.
    position: Mutex<f64>,
    rate: AtomicF32,
    volume: AtomicF32,
    playing: AtomicBool,
    notifier: PlayerNotifier,
}

impl Voice {
    pub fn new(rate: f32, volume: f32, notifier: PlayerNotifier) -> Voice {
        Voice {
            id: VOICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            data: RwLock::new(None),
            position: Mutex::new(0.0),
            rate: AtomicF32::new(rate),
            volume: AtomicF32::new(volume),
            playing: AtomicBool::new(false),
            notifier,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_data(&self, data: Arc<DecodedSound>) {
        *self.data.write() = Some(data);
    }

    pub fn is_loaded(&self) -> bool {
        self.data.read().is_some()
    }

    /// Starts the voice from the beginning. Does nothing until data is loaded.
    pub fn start(&self) {
        if !self.is_loaded() {
            return;
        }
        *self.position.lock() = 0.0;
        self.playing.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.playing.store(false, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_rate(&self, rate: f32) {
        self.rate.store(rate);
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume);
    }

    /// Mixes this voice into the interleaved output. Returns false once the voice has
    /// played to the end, in which case the end has already been reported.
    fn mix_into(&self, output: &mut [f32], num_channels: u16, sample_rate: u32) -> bool {
        let data = match self.data.read().as_ref() {
            Some(data) => data.clone(),
            None => return true,
        };
        let volume = self.volume.load();
        let step =
            self.rate.load() as f64 * data.sample_rate() as f64 / sample_rate.max(1) as f64;
        let frames = data.frames();

        let mut position = self.position.lock();
        for frame in output.chunks_mut(num_channels as usize) {
            let index = position.floor() as usize;
            if index >= frames {
                break;
            }
            let frac = (*position - index as f64) as f32;
            for (channel, out) in frame.iter_mut().enumerate() {
                let channel = channel as u16;
                let s0 = data.sample(index, channel);
                let s1 = if index + 1 < frames {
                    data.sample(index + 1, channel)
                } else {
                    s0
                };
                // Linear interpolation
                *out += (s0 + (s1 - s0) * frac) * volume;
            }
            *position += step;
        }

        if *position < frames as f64 {
            return true;
        }

        // Only report the end if nobody stopped the voice in the meantime.
        if self
            .playing
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notifier.ended();
        }
        false
    }
}

/// Core audio mixing logic that's independent of any audio backend
pub struct Mixer {
    voices: Mutex<Vec<Arc<Voice>>>,
    num_channels: u16,
    sample_rate: u32,
}

impl Mixer {
    pub fn new(num_channels: u16, sample_rate: u32) -> Mixer {
        Mixer {
            voices: Mutex::new(Vec::new()),
            num_channels: num_channels.max(1),
            sample_rate,
        }
    }

    pub fn add(&self, voice: Arc<Voice>) {
        self.voices.lock().push(voice);
    }

    pub fn remove(&self, id: u64) {
        self.voices.lock().retain(|voice| voice.id() != id);
    }

    /// Stops every voice without reporting an end.
    pub fn stop_all(&self) {
        for voice in self.voices.lock().iter() {
            voice.stop();
        }
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fills the interleaved output buffer with the sum of all playing voices.
    pub fn process_into(&self, output: &mut [f32]) {
        output.fill(0.0);
        let voices = self.voices.lock();
        for voice in voices.iter().filter(|voice| voice.is_playing()) {
            voice.mix_into(output, self.num_channels, self.sample_rate);
        }
        for sample in output.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
