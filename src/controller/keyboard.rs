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
use std::io;
use std::str::FromStr;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::unit::{UnitId, DEFAULT_PITCH, DEFAULT_VOLUME};

const ADD: &str = "add";
const SELECT: &str = "select";
const PITCH: &str = "pitch";
const VOLUME: &str = "volume";
const OFFSET: &str = "offset";
const PLAY: &str = "play";
const STOP: &str = "stop";
const REMOVE: &str = "remove";
const PLAY_ALL: &str = "play-all";
const STOP_ALL: &str = "stop-all";
const LIST: &str = "list";
const SEARCH: &str = "search";
const LINK: &str = "link";
const QUIT: &str = "quit";

/// A controller that drives a session from commands typed on the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and dispatches one command. Returns false once input is exhausted or the
    /// user quits.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "> ")?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            return Ok(false);
        }
        if input.trim().is_empty() {
            return Ok(true);
        }

        let event = match parse(&input) {
            Ok(event) => event,
            Err(e) => {
                warn!(input = input.trim(), err = e, "Unrecognized input");
                writeln!(writer, "{}", e)?;
                return Ok(true);
            }
        };
        let quit = event == Event::Quit;
        events_tx
            .blocking_send(event)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(!quit)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

fn arg<'a>(args: &[&'a str], index: usize, name: &str) -> Result<&'a str, String> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("missing {}", name))
}

fn number<T: FromStr>(args: &[&str], index: usize, name: &str) -> Result<T, String> {
    let value = arg(args, index, name)?;
    value
        .parse()
        .map_err(|_| format!("invalid {} '{}'", name, value))
}

fn optional_number<T: FromStr>(
    args: &[&str],
    index: usize,
    name: &str,
    default: T,
) -> Result<T, String> {
    if index < args.len() {
        number(args, index, name)
    } else {
        Ok(default)
    }
}

fn id(args: &[&str]) -> Result<UnitId, String> {
    number::<u64>(args, 0, "id").map(UnitId::new)
}

/// Parses a command line into an event.
pub fn parse(input: &str) -> Result<Event, String> {
    let mut words = input.split_whitespace();
    let command = words.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = words.collect();

    Ok(match command.as_str() {
        ADD => Event::Add {
            name: arg(&args, 0, "sound")?.to_string(),
            pitch: optional_number(&args, 1, "pitch", DEFAULT_PITCH)?,
            volume: optional_number(&args, 2, "volume", DEFAULT_VOLUME)?,
        },
        SELECT => Event::Select {
            id: id(&args)?,
            name: arg(&args, 1, "sound")?.to_string(),
        },
        PITCH => Event::Pitch {
            id: id(&args)?,
            pitch: number(&args, 1, "pitch")?,
        },
        VOLUME => Event::Volume {
            id: id(&args)?,
            volume: number(&args, 1, "volume")?,
        },
        OFFSET => Event::Offset {
            id: id(&args)?,
            ticks: number(&args, 1, "offset")?,
        },
        PLAY => Event::Play(id(&args)?),
        STOP => Event::Stop(id(&args)?),
        REMOVE => Event::Remove(id(&args)?),
        PLAY_ALL => Event::PlayAll,
        STOP_ALL => Event::StopAll,
        LIST => Event::List,
        SEARCH => Event::Search(args.first().copied().unwrap_or_default().to_string()),
        LINK => Event::Link(id(&args)?),
        QUIT => Event::Quit,
        _ => {
            return Err(format!(
                "commands: {} <sound> [pitch] [volume], {} <id> <sound>, {}|{}|{} <id> <value>, \
                 {}|{}|{}|{} <id>, {}, {}, {}, {} [filter], {}",
                ADD,
                SELECT,
                PITCH,
                VOLUME,
                OFFSET,
                PLAY,
                STOP,
                REMOVE,
                LINK,
                PLAY_ALL,
                STOP_ALL,
                LIST,
                SEARCH,
                QUIT
            ))
        }
    })
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, BufReader, BufWriter};

    use tokio::sync::mpsc;

    use crate::controller::{keyboard::*, Event};
    use crate::unit::UnitId;

    use super::Driver;

    fn get_event(input: &str) -> Result<(bool, Option<Event>), io::Error> {
        let (sender, mut receiver) = mpsc::channel::<Event>(1);

        let reader = BufReader::new(input.as_bytes());

        let writer_bytes: Vec<u8> = vec![0; 255];
        let writer = BufWriter::new(writer_bytes);
        let more = Driver::monitor_io(&sender, reader, writer)?;

        // Force the sender to close.
        drop(sender);
        Ok((more, receiver.blocking_recv()))
    }

    #[test]
    fn test_keyboard_events() -> Result<(), io::Error> {
        assert_eq!(
            (
                true,
                Some(Event::Add {
                    name: "entity.cow.ambient".to_string(),
                    pitch: 1.0,
                    volume: 1.0
                })
            ),
            get_event("add entity.cow.ambient\n")?
        );
        assert_eq!(
            (
                true,
                Some(Event::Add {
                    name: "block.note_block.harp".to_string(),
                    pitch: 1.5,
                    volume: 0.5
                })
            ),
            get_event("ADD block.note_block.harp 1.5 0.5\n")?
        );
        assert_eq!(
            (true, Some(Event::Play(UnitId::new(3)))),
            get_event("play 3")?
        );
        assert_eq!((true, Some(Event::PlayAll)), get_event(PLAY_ALL)?);
        assert_eq!((true, Some(Event::StopAll)), get_event(STOP_ALL)?);
        assert_eq!(
            (
                true,
                Some(Event::Offset {
                    id: UnitId::new(2),
                    ticks: 4
                })
            ),
            get_event("offset 2 4")?
        );
        assert_eq!((true, None), get_event("unrecognized")?);
        assert_eq!((true, None), get_event("play")?);
        assert_eq!((true, None), get_event("\n")?);
        assert_eq!((false, Some(Event::Quit)), get_event(QUIT)?);
        assert_eq!((false, Some(Event::Quit)), get_event("")?);
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Err("missing sound".to_string()), parse("add"));
        assert_eq!(Err("invalid id 'x'".to_string()), parse("stop x"));
        assert_eq!(Err("invalid offset '-1'".to_string()), parse("offset 1 -1"));
        assert_eq!(
            Ok(Event::Search(String::new())),
            parse("search")
        );
    }
}
