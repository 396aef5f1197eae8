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
use std::{
    error::Error,
    fmt,
    sync::{mpsc, Arc},
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, span, warn, Level};

use super::decode::{self, DecodedSound};
use super::mixer::{Mixer, Voice};
use super::{PlayerNotifier, PlayerRequest};
use crate::resources::ResourceResolver;

/// Plays sounds through a cpal output device. The cpal stream lives on its own thread
/// and pulls from a shared mixer.
pub struct Backend {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The mixer the output stream reads from.
    mixer: Arc<Mixer>,
    /// Fetches the audio for new players.
    resources: Arc<ResourceResolver>,
    /// Dropping or signalling this stops the output thread.
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    /// Handle to the output thread, which owns the stream.
    output_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, SampleRate={}) ({})",
            self.name,
            self.mixer.num_channels(),
            self.mixer.sample_rate(),
            self.host_id.name()
        )
    }
}

/// Builds an output stream for a concrete sample type, converting from the mixer's f32.
fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mixer>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.process_into(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: Arc<Mixer>,
) -> Result<cpal::Stream, Box<dyn Error>> {
    Ok(match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, mixer)?,
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, mixer)?,
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, config, mixer)?,
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, config, mixer)?,
        other => return Err(format!("unsupported sample format {:?}", other).into()),
    })
}

/// Fetches and decodes one sound. Decoding happens off the async runtime.
async fn load_sound(
    resources: &ResourceResolver,
    url: &str,
) -> Result<DecodedSound, Box<dyn Error + Send + Sync>> {
    let bytes = resources.fetch(url).await?;
    Ok(tokio::task::spawn_blocking(move || decode::decode(bytes)).await??)
}

impl Backend {
    /// Lists the output devices of every available host.
    pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                match device.name() {
                    Ok(name) => devices.push(format!("{} ({})", name.trim(), host_id.name())),
                    Err(e) => warn!(err = e.to_string(), "Unable to read device name"),
                }
            }
        }

        devices.sort();
        Ok(devices)
    }

    fn find_device(name: Option<&str>) -> Result<(cpal::HostId, cpal::Device), Box<dyn Error>> {
        let host = cpal::default_host();
        let device = match name {
            None => host
                .default_output_device()
                .ok_or("no default output device")?,
            Some(name) => host
                .output_devices()?
                .find(|device| {
                    device
                        .name()
                        .map(|device_name| device_name.trim() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| format!("no device found with name {}", name))?,
        };
        Ok((host.id(), device))
    }

    /// Opens the named output device, or the default device, and starts its stream.
    pub fn get(
        device_name: Option<&str>,
        resources: Arc<ResourceResolver>,
    ) -> Result<Backend, Box<dyn Error>> {
        let (host_id, device) = {
            // Suppress noisy output here.
            let _shh_stdout = shh::stdout()?;
            let _shh_stderr = shh::stderr()?;
            Backend::find_device(device_name)?
        };
        let name = device.name()?.trim().to_string();

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();
        let mixer = Arc::new(Mixer::new(config.channels, config.sample_rate));
        info!(
            device = name,
            channels = config.channels,
            sample_rate = config.sample_rate,
            format = format!("{:?}", sample_format),
            "Opening output device"
        );

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let thread_mixer = mixer.clone();
        let output_thread = thread::spawn(move || {
            let stream = match build_stream(&device, &config, sample_format, thread_mixer) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("failed to create CPAL stream: {}", e)));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(format!("failed to start CPAL stream: {}", e)));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            info!("CPAL output stream started successfully");

            // Keep the stream alive until the backend goes away.
            let _ = shutdown_rx.recv();
            drop(stream);
            debug!("CPAL output stream stopped");
        });

        ready_rx
            .recv()
            .map_err(|_| "output thread exited before the stream started")??;

        Ok(Backend {
            name,
            host_id,
            mixer,
            resources,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            output_thread: Mutex::new(Some(output_thread)),
        })
    }
}

impl super::Backend for Backend {
    fn create_player(
        &self,
        request: PlayerRequest,
        notifier: PlayerNotifier,
    ) -> Box<dyn super::Player> {
        let span = span!(Level::DEBUG, "create player (cpal)");
        let _enter = span.enter();

        let voice = Arc::new(Voice::new(
            request.settings.rate,
            request.settings.volume,
            notifier.clone(),
        ));
        self.mixer.add(voice.clone());
        debug!(url = request.url, voice = voice.id(), "Loading sound");

        let resources = self.resources.clone();
        let loading_voice = voice.clone();
        let url = request.url;
        let load = tokio::spawn(async move {
            match load_sound(&resources, &url).await {
                Ok(sound) => {
                    debug!(
                        url,
                        frames = sound.frames(),
                        channels = sound.channels(),
                        "Sound buffered"
                    );
                    loading_voice.set_data(Arc::new(sound));
                    notifier.buffered();
                }
                Err(e) => {
                    warn!(url, err = %e, "Unable to load sound");
                    notifier.failed(e.to_string());
                }
            }
        });

        Box::new(Player {
            mixer: self.mixer.clone(),
            voice,
            load,
        })
    }

    fn stop_all(&self) {
        self.mixer.stop_all();
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(output_thread) = self.output_thread.lock().take() {
            if output_thread.join().is_err() {
                error!("Error while joining output thread");
            }
        }
    }
}

/// A single sound in the cpal mixer.
struct Player {
    mixer: Arc<Mixer>,
    voice: Arc<Voice>,
    load: JoinHandle<()>,
}

impl super::Player for Player {
    fn play(&mut self) {
        self.voice.start();
    }

    fn stop(&mut self) {
        self.voice.stop();
    }

    fn set_rate(&mut self, rate: f32) {
        self.voice.set_rate(rate);
    }

    fn set_volume(&mut self, volume: f32) {
        self.voice.set_volume(volume);
    }

    fn is_playing(&self) -> bool {
        self.voice.is_playing()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.load.abort();
        self.voice.stop();
        self.mixer.remove(self.voice.id());
    }
}
