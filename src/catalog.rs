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

//! The sound event catalog, parsed from the game's `sounds.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Errors that prevent a sound event from resolving to playable files.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown sound event '{0}'")]
    UnknownEvent(String),

    #[error("sound event '{0}' has no sounds")]
    EmptyEvent(String),

    #[error("no asset hash for '{0}'")]
    MissingAsset(String),

    #[error("sound event '{0}' references itself")]
    EventCycle(String),
}

/// All sound events by name. Names are case-sensitive.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct SoundCatalog {
    events: BTreeMap<String, SoundEvent>,
}

/// A sound event: an ordered list of variations, one of which plays per trigger.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct SoundEvent {
    #[serde(default)]
    pub sounds: Vec<SoundEntry>,
    /// Other event fields, such as the subtitle key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single variation in a sound event.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum SoundEntry {
    Path(String),
    Detailed(DetailedEntry),
}

/// A variation with metadata. Only `name` and `type` are interpreted; everything else
/// (volume, pitch, weight, stream, ...) is carried through untouched.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DetailedEntry {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SoundEntry {
    /// The extensionless sound path, or the referenced event name for event entries.
    pub fn name(&self) -> &str {
        match self {
            SoundEntry::Path(path) => path,
            SoundEntry::Detailed(entry) => &entry.name,
        }
    }

    /// Returns true if this entry refers to another sound event rather than a file.
    pub fn is_event_reference(&self) -> bool {
        matches!(self, SoundEntry::Detailed(entry) if entry.kind.as_deref() == Some("event"))
    }
}

impl SoundCatalog {
    /// Parses a catalog from the raw `sounds.json` document.
    pub fn from_slice(bytes: &[u8]) -> Result<SoundCatalog, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Gets an event by name.
    pub fn get(&self, name: &str) -> Option<&SoundEvent> {
        self.events.get(name)
    }

    /// The number of events, including non-playable ones.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Names of all events with at least one entry, in sorted order.
    pub fn playable_names(&self) -> impl Iterator<Item = &str> {
        self.events
            .iter()
            .filter(|(_, event)| !event.sounds.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Playable event names containing the filter.
    pub fn search<'a>(&'a self, filter: &'a str) -> impl Iterator<Item = &'a str> {
        self.playable_names().filter(move |name| name.contains(filter))
    }

    /// Expands an event into the file entries it plays, following event references.
    pub fn expand(&self, name: &str) -> Result<Vec<&SoundEntry>, ResolveError> {
        let mut entries = Vec::new();
        let mut stack = Vec::new();
        self.expand_into(name, &mut stack, &mut entries)?;
        if entries.is_empty() {
            return Err(ResolveError::EmptyEvent(name.to_string()));
        }
        Ok(entries)
    }

    fn expand_into<'a>(
        &'a self,
        name: &str,
        stack: &mut Vec<String>,
        entries: &mut Vec<&'a SoundEntry>,
    ) -> Result<(), ResolveError> {
        if stack.iter().any(|visited| visited == name) {
            return Err(ResolveError::EventCycle(name.to_string()));
        }
        let event = self
            .get(name)
            .ok_or_else(|| ResolveError::UnknownEvent(name.to_string()))?;

        stack.push(name.to_string());
        for entry in &event.sounds {
            if entry.is_event_reference() {
                self.expand_into(entry.name(), stack, entries)?;
            } else {
                entries.push(entry);
            }
        }
        stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SOUNDS: &str = r#"{
        "entity.cow.ambient": {
            "subtitle": "subtitles.entity.cow.ambient",
            "sounds": ["mob/cow/say1", {"name": "mob/cow/say2", "weight": 2, "pitch": 0.8}]
        },
        "entity.cow.alias": {"sounds": [{"name": "entity.cow.ambient", "type": "event"}, "mob/cow/step1"]},
        "ambient.silence": {"sounds": []},
        "ambient.replaced": {"replace": true},
        "loop.a": {"sounds": [{"name": "loop.b", "type": "event"}]},
        "loop.b": {"sounds": [{"name": "loop.a", "type": "event"}]},
        "broken.ref": {"sounds": [{"name": "does.not.exist", "type": "event"}]}
    }"#;

    fn catalog() -> SoundCatalog {
        SoundCatalog::from_slice(SOUNDS.as_bytes()).unwrap()
    }

    #[test]
    fn test_entries() {
        let catalog = catalog();
        let event = catalog.get("entity.cow.ambient").unwrap();
        assert_eq!(2, event.sounds.len());
        assert_eq!("mob/cow/say1", event.sounds[0].name());
        assert_eq!("mob/cow/say2", event.sounds[1].name());
        assert!(!event.sounds[1].is_event_reference());
        assert!(catalog.get("Entity.Cow.Ambient").is_none());
    }

    #[test]
    fn test_playable_names() {
        let catalog = catalog();
        let names: Vec<&str> = catalog.playable_names().collect();
        assert!(names.contains(&"entity.cow.ambient"));
        assert!(!names.contains(&"ambient.silence"));
        assert!(!names.contains(&"ambient.replaced"));
        assert_eq!(7, catalog.len());

        let cows: Vec<&str> = catalog.search("cow").collect();
        assert_eq!(vec!["entity.cow.alias", "entity.cow.ambient"], cows);
    }

    #[test]
    fn test_expand() {
        let catalog = catalog();
        let names: Vec<&str> = catalog
            .expand("entity.cow.alias")
            .unwrap()
            .into_iter()
            .map(|entry| entry.name())
            .collect();
        assert_eq!(vec!["mob/cow/say1", "mob/cow/say2", "mob/cow/step1"], names);
    }

    #[test]
    fn test_expand_errors() {
        let catalog = catalog();
        assert_eq!(
            Err(ResolveError::UnknownEvent("nope".to_string())),
            catalog.expand("nope")
        );
        assert_eq!(
            Err(ResolveError::EmptyEvent("ambient.silence".to_string())),
            catalog.expand("ambient.silence")
        );
        assert_eq!(
            Err(ResolveError::EventCycle("loop.a".to_string())),
            catalog.expand("loop.a")
        );
        assert_eq!(
            Err(ResolveError::UnknownEvent("does.not.exist".to_string())),
            catalog.expand("broken.ref")
        );
    }

    #[test]
    fn test_metadata_survives_reserialization() {
        let catalog = catalog();
        let value = serde_json::to_value(&catalog).unwrap();
        let original: Value = serde_json::from_str(SOUNDS).unwrap();

        assert_eq!(
            original["entity.cow.ambient"],
            value["entity.cow.ambient"]
        );
        assert_eq!(original["entity.cow.alias"], value["entity.cow.alias"]);
        assert_eq!(true, value["ambient.replaced"]["replace"]);
    }
}
