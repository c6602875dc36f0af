use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

use crate::cue::cue::{Cue, Media};
use crate::protocol::encoder;
use crate::publisher::Publisher;
use crate::show::show_store::{ShowStore, StorageError};

/// Default rewind/fast-forward speed multiplier.
const DEFAULT_RWFF_SPEED: f64 = 2.0;

/// Change notifications broadcast by the document after every mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum DocumentEvent {
    /// The cursor moved.
    CuePointer,
    /// The cue sequence changed (insert, replace, delete, load).
    Cues,
    /// Only the current cue's name changed; observers may do a cheaper
    /// partial refresh than for `Cues`.
    CueName,
    /// The media registry was replaced.
    MediaRegistry,
    /// The rewind/fast-forward multiplier changed.
    RwffSpeed,
    /// A mutation happened with no storage location set; nothing was
    /// written to disk.
    UnsavedChanges,
}

/// The ordered cue sequence plus a cursor, the media registry and the
/// operator's rw/ff multiplier.
///
/// Invariants held by construction: the sequence is never empty and the
/// cursor always lies in `[0, cues.len())`. Every mutation emits a
/// `DocumentEvent` and, when a storage location is set, persists
/// immediately with backup rotation.
pub struct CueDocument {
    cues: Vec<Cue>,
    cue_pointer: usize,
    store: Option<ShowStore>,
    media: BTreeMap<u32, Media>,
    rwff_speed: f64,
    events: Publisher<DocumentEvent>,
}

impl CueDocument {
    /// An unsaved, in-memory document: one BLANK cue and a registry
    /// holding only the blank entry.
    pub fn new() -> Self {
        let mut media = BTreeMap::new();
        media.insert(0, Media::blank());
        Self {
            cues: vec![Cue::blank()],
            cue_pointer: 0,
            store: None,
            media,
            rwff_speed: DEFAULT_RWFF_SPEED,
            events: Publisher::new(),
        }
    }

    /// Open a show folder. Fails if the cue file or media registry is
    /// missing or malformed; the caller surfaces this rather than
    /// falling back to a default document.
    pub fn open(folder: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = ShowStore::new(folder);
        let cues = store.load_cues()?;
        let media = store.load_media()?;
        let mut doc = Self::new();
        if !cues.is_empty() {
            doc.cues = cues;
        }
        doc.media = media;
        doc.store = Some(store);
        doc.cue_pointer = 0;
        Ok(doc)
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DocumentEvent> {
        self.events.subscribe()
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn cue_pointer(&self) -> usize {
        self.cue_pointer
    }

    pub fn folder(&self) -> Option<&Path> {
        self.store.as_ref().map(|s| s.folder())
    }

    pub fn media(&self) -> &BTreeMap<u32, Media> {
        &self.media
    }

    pub fn rwff_speed(&self) -> f64 {
        self.rwff_speed
    }

    pub fn set_rwff_speed(&mut self, speed: f64) {
        self.rwff_speed = speed;
        self.events.publish(DocumentEvent::RwffSpeed);
    }

    pub fn current_cue(&self) -> &Cue {
        &self.cues[self.cue_pointer]
    }

    /// Move the cursor to `index` modulo the sequence length. Negative
    /// indices wrap from the end.
    pub fn goto_cue(&mut self, index: i64) {
        let len = self.cues.len() as i64;
        self.cue_pointer = index.rem_euclid(len) as usize;
        self.events.publish(DocumentEvent::CuePointer);
    }

    pub fn increment_cue(&mut self) {
        self.cue_pointer = (self.cue_pointer + 1) % self.cues.len();
        self.events.publish(DocumentEvent::CuePointer);
    }

    pub fn decrement_cue(&mut self) {
        self.cue_pointer = (self.cue_pointer + self.cues.len() - 1) % self.cues.len();
        self.events.publish(DocumentEvent::CuePointer);
    }

    pub fn replace_current_cue(&mut self, cue: Cue) -> Result<(), StorageError> {
        self.cues[self.cue_pointer] = cue;
        self.events.publish(DocumentEvent::Cues);
        self.persist()
    }

    pub fn insert_before(&mut self, cue: Cue) -> Result<(), StorageError> {
        self.cues.insert(self.cue_pointer, cue);
        self.events.publish(DocumentEvent::Cues);
        self.persist()
    }

    /// Insert after the cursor; the cursor advances so the new cue
    /// becomes current.
    pub fn insert_after(&mut self, cue: Cue) -> Result<(), StorageError> {
        self.cue_pointer += 1;
        self.cues.insert(self.cue_pointer, cue);
        self.events.publish(DocumentEvent::Cues);
        self.persist()
    }

    pub fn insert_blank_before(&mut self, name: impl Into<String>) -> Result<(), StorageError> {
        self.insert_before(Cue::new(name))
    }

    pub fn insert_blank_after(&mut self, name: impl Into<String>) -> Result<(), StorageError> {
        self.insert_after(Cue::new(name))
    }

    pub fn rename_current_cue(&mut self, name: impl Into<String>) -> Result<(), StorageError> {
        self.cues[self.cue_pointer].name = name.into();
        self.events.publish(DocumentEvent::CueName);
        self.persist()
    }

    /// Remove the cue at the cursor. Deleting the last remaining cue
    /// reinstalls the single default BLANK cue.
    pub fn delete_current_cue(&mut self) -> Result<(), StorageError> {
        self.cues.remove(self.cue_pointer);
        if self.cues.is_empty() {
            self.cues.push(Cue::blank());
        }
        if self.cue_pointer == self.cues.len() {
            self.cue_pointer -= 1;
        }
        self.events.publish(DocumentEvent::Cues);
        self.persist()
    }

    /// The atomic GO action: encode the current cue for the wire and
    /// optionally advance the cursor. Returns the cue's name and the
    /// positional field array for transmission. Bus-state mirroring is
    /// applied by the console, which owns the bus records.
    pub fn fire_current_cue(&mut self, advance: bool) -> (String, Vec<String>) {
        let cue = self.current_cue();
        let name = cue.name.clone();
        let payload = encoder::encode_cue_state(cue);
        if advance {
            self.increment_cue();
        }
        (name, payload)
    }

    /// Create the show folder (with backup area), write everything and
    /// make it the document's storage location. Subsequent mutations
    /// persist automatically.
    pub fn save_as(&mut self, folder: impl Into<PathBuf>) -> Result<(), StorageError> {
        let store = ShowStore::new(folder);
        store.create()?;
        store.write_cues(&self.cues)?;
        store.write_media(&self.media)?;
        self.store = Some(store);
        Ok(())
    }

    /// Wholesale registry replacement; identifier 0 stays pinned to
    /// BLANK regardless of the input.
    pub fn update_media_registry(
        &mut self,
        mut entries: BTreeMap<u32, Media>,
    ) -> Result<(), StorageError> {
        entries.insert(0, Media::blank());
        self.media = entries;
        self.events.publish(DocumentEvent::MediaRegistry);
        if let Some(store) = &self.store {
            store.write_media(&self.media)?;
        } else {
            self.events.publish(DocumentEvent::UnsavedChanges);
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        match &self.store {
            Some(store) => store.write_cues(&self.cues),
            None => {
                self.events.publish(DocumentEvent::UnsavedChanges);
                Ok(())
            }
        }
    }
}

impl Default for CueDocument {
    fn default() -> Self {
        Self::new()
    }
}
