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

//! Decodes fetched audio into memory. Sounds are short, so they are decoded fully
//! up front and played from memory.

use std::io::{Cursor, ErrorKind};
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

/// The container extension of game sound files.
pub const SOUND_EXTENSION: &str = "ogg";

/// Error types for decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Audio decode error: {0}")]
    Audio(#[from] SymphoniaError),

    #[error("No audio track found")]
    NoTrack,

    #[error("Unknown {0}")]
    MissingParameter(&'static str),
}

/// Interleaved f32 samples decoded from a sound file.
#[derive(Clone, Debug)]
pub struct DecodedSound {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedSound {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> DecodedSound {
        DecodedSound {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Gets the sample for a frame and channel, or silence past the end.
    #[inline]
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        let channel = channel.min(self.channels - 1) as usize;
        self.samples
            .get(frame * self.channels as usize + channel)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decodes a complete audio file held in memory.
pub fn decode(bytes: Vec<u8>) -> Result<DecodedSound, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(SOUND_EXTENSION);

    let detected = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = detected.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet only costs a few milliseconds of audio.
                warn!(err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let sample_rate = sample_rate.ok_or(DecodeError::MissingParameter("sample rate"))?;
    let channels = channels.ok_or(DecodeError::MissingParameter("channel count"))?;
    let sound = DecodedSound::new(samples, channels, sample_rate);

    debug!(
        channels,
        sample_rate,
        duration_ms = sound.duration().as_millis() as u64,
        "Decoded sound"
    );
    Ok(sound)
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use hound::{SampleFormat, WavSpec, WavWriter};

    use super::*;

    fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(
                &mut cursor,
                WavSpec {
                    channels,
                    sample_rate,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                },
            )
            .unwrap();
            for frame in 0..frames {
                for channel in 0..channels {
                    let value = if channel == 0 { 8192 } else { -8192 };
                    writer
                        .write_sample(if frame % 2 == 0 { value } else { 0i16 })
                        .unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_stereo() {
        let sound = decode(wav_bytes(2, 22050, 2205)).unwrap();
        assert_eq!(2, sound.channels());
        assert_eq!(22050, sound.sample_rate());
        assert_eq!(2205, sound.frames());
        assert_eq!(100, sound.duration().as_millis());
        assert!((sound.sample(0, 0) - 0.25).abs() < 0.001);
        assert!((sound.sample(0, 1) + 0.25).abs() < 0.001);
        assert_eq!(0.0, sound.sample(1, 0));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode(b"definitely not audio".to_vec()).is_err());
    }

    #[test]
    fn test_sample_past_end_is_silent() {
        let sound = DecodedSound::new(vec![0.5, 0.5], 1, 44100);
        assert_eq!(2, sound.frames());
        assert_eq!(0.5, sound.sample(1, 3));
        assert_eq!(0.0, sound.sample(2, 0));
    }
}
