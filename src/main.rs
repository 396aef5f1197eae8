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
mod audio;
mod catalog;
mod config;
mod context;
mod controller;
mod link;
mod manifest;
mod preferences;
mod resources;
mod scheduler;
mod session;
mod unit;

use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::context::AppContext;
use crate::link::ShareLink;
use crate::manifest::VersionSelector;
use crate::preferences::Preferences;
use crate::resources::{DiskCache, HttpTransport, MemoryCache, ResourceResolver, ResponseCache};
use crate::session::Session;
use crate::unit::{SoundPlaybackUnit, Status, UnitId, DEFAULT_PITCH, DEFAULT_VOLUME};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A browser and previewer for Minecraft sound events."
)]
struct Cli {
    /// The path to a YAML settings file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// The game version to load: latest-snapshot, latest-release or a version id.
    #[arg(short = 'm', long, global = true)]
    mc_version: Option<String>,

    /// Don't read or write the on-disk resource cache.
    #[arg(long, global = true)]
    no_cache: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the versions in the version manifest.
    Versions {},
    /// Lists playable sound events.
    Sounds {
        /// Only list sound events containing this text.
        filter: Option<String>,
    },
    /// Prints the resources a sound event resolves to.
    Resolve {
        /// The sound event name.
        sound: String,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Plays one variation of a sound event and waits for it to finish.
    Play {
        /// The sound event name.
        sound: String,
        /// The pitch multiplier, between 0.5 and 2.
        #[arg(short, long, default_value_t = DEFAULT_PITCH)]
        pitch: f32,
        /// The volume, between 0 and 1.
        #[arg(short, long, default_value_t = DEFAULT_VOLUME)]
        volume: f32,
    },
    /// Prints the sound selection described by a share link.
    Link {
        /// The share link.
        url: String,
    },
    /// Starts an interactive session.
    Start {
        /// Starts with the sound from this share link.
        #[arg(short, long)]
        link: Option<String>,
    },
}

/// Builds the resource resolver described by the settings.
fn resolver(settings: &Settings) -> Result<Arc<ResourceResolver>, Box<dyn Error>> {
    let cache: Arc<dyn ResponseCache> = match settings.cache_dir() {
        Some(cache_dir) => {
            let cache = DiskCache::new(&cache_dir);
            info!(path = ?cache.root(), "Using disk cache");
            Arc::new(cache)
        }
        None => Arc::new(MemoryCache::new()),
    };
    Ok(Arc::new(ResourceResolver::new(
        settings.resource_base(),
        settings.resource_proxy().map(str::to_string),
        Arc::new(HttpTransport::new()?),
        cache,
    )))
}

/// Picks the version to load. The command line wins over the settings, which win over
/// the remembered preference.
fn version_selector(cli_version: Option<&str>, settings: &Settings) -> VersionSelector {
    if let Some(version) = cli_version.or(settings.version()) {
        return version.parse().unwrap_or_default();
    }
    Preferences::default_location()
        .map(|preferences| preferences.version_or_default())
        .unwrap_or_default()
}

async fn load_context(
    cli_version: Option<&str>,
    settings: &Settings,
) -> Result<Arc<AppContext>, Box<dyn Error>> {
    let selector = version_selector(cli_version, settings);
    let context = AppContext::load(resolver(settings)?, settings.manifest_url(), &selector).await?;

    // Only explicit choices are remembered.
    if cli_version.is_some() {
        if let Some(preferences) = Preferences::default_location() {
            if let Err(e) = preferences.set_version(context.version()) {
                warn!(err = %e, "Unable to save version preference");
            }
        }
    }
    Ok(Arc::new(context))
}

/// Handles session events until the unit satisfies the predicate.
async fn wait_for(
    session: &mut Session,
    id: UnitId,
    predicate: impl Fn(&SoundPlaybackUnit) -> bool,
) -> Result<(), Box<dyn Error>> {
    loop {
        let unit = session
            .unit(id)
            .ok_or_else(|| format!("sound {} went away", id))?;
        if predicate(unit) {
            return Ok(());
        }
        match session.next_event().await {
            Some(event) => session.handle_event(event),
            None => return Err("session closed unexpectedly".into()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let settings = if cli.no_cache {
        settings.without_cache()
    } else {
        settings
    };
    let cli_version = cli.mc_version.as_deref();

    match cli.command {
        Commands::Versions {} => {
            let resources = resolver(&settings)?;
            let manifest = context::load_manifest(&resources, settings.manifest_url()).await?;
            let selected = manifest
                .select(&version_selector(cli_version, &settings))
                .map(|version| version.id.clone());
            println!(
                "Latest release: {}, latest snapshot: {}",
                manifest.latest.release, manifest.latest.snapshot
            );
            for version in manifest.versions.iter() {
                let marker = if Some(&version.id) == selected.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, version);
            }
        }
        Commands::Sounds { filter } => {
            let context = load_context(cli_version, &settings).await?;
            let filter = filter.unwrap_or_default();
            let mut count = 0;
            for name in context.catalog().search(&filter) {
                println!("{}", name);
                count += 1;
            }
            info!(count, version = context.version(), "Listed sounds");
        }
        Commands::Resolve { sound } => {
            let context = load_context(cli_version, &settings).await?;
            for resolved in context.resolve(&sound)? {
                println!("{} {} {}", resolved.path, resolved.hash, resolved.url);
            }
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            sound,
            pitch,
            volume,
        } => {
            let context = load_context(cli_version, &settings).await?;
            let backend = audio::get_backend(&settings, context.resources().clone())?;
            let mut session = Session::new(context, backend, settings.tick()?);
            let id = session.add_unit(&sound, pitch, volume);

            wait_for(&mut session, id, |unit| unit.status() == Status::Loaded).await?;
            if session.unit(id).is_some_and(|unit| unit.is_invalid()) {
                return Err(format!("{} is not playable", sound).into());
            }
            session.play(id)?;
            wait_for(&mut session, id, |unit| unit.status() != Status::Playing).await?;
        }
        Commands::Link { url } => {
            let link = ShareLink::parse(&url)?;
            println!(
                "sound: {}\npitch: {}\nvolume: {}",
                link.sound, link.pitch, link.volume
            );
        }
        Commands::Start { link } => {
            let link = link.map(|link| ShareLink::parse(&link)).transpose()?;
            let context = load_context(cli_version, &settings).await?;
            let backend = audio::get_backend(&settings, context.resources().clone())?;
            println!("Loaded {} using {}", context.version(), backend);

            let mut session = Session::new(context, backend, settings.tick()?);
            if let Some(link) = link {
                session.add_unit(&link.sound, link.pitch, link.volume);
            }
            let mut controller = controller::Controller::new(
                session,
                Arc::new(controller::keyboard::Driver::new()),
                settings.link_base(),
            );
            controller.join().await?;
        }
    }

    Ok(())
}
