use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cue::cue::{Cue, Media};

/// Semantic action tokens consumed by the console. The control surface
/// (GUI or MIDI) translates operator intent into these; it never
/// touches the model directly.
#[derive(Debug, Clone)]
pub enum ConsoleCommand {
    // Cue list navigation and editing
    Go,
    IncrementCue,
    DecrementCue,
    GotoCue { index: i64 },
    ReplaceCurrentCue { cue: Cue },
    InsertCueBefore { cue: Cue },
    InsertCueAfter { cue: Cue },
    InsertBlankBefore,
    InsertBlankAfter,
    DeleteCurrentCue,
    RenameCurrentCue { name: String },
    SetRwffSpeed { speed: f64 },

    // Per-bus transport
    PlayBus { bus: usize },
    PauseBus { bus: usize },
    RewindBus { bus: usize },
    FastForwardBus { bus: usize },
    ScrubBus { bus: usize, pos: f64 },

    // All-bus transport
    PlayAll,
    PauseAll,
    RewindAll,
    FastForwardAll,
    BlankAll,
    Transport { token: String },

    // Show management
    LoadShow { path: PathBuf },
    SaveShowAs { path: PathBuf },
    UpdateMediaRegistry { entries: BTreeMap<u32, Media> },

    // Settings
    UpdateSettings { settings: Settings },

    Shutdown,
}

/// Events emitted by the console for the control surface to render.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    // Document
    CuePointerChanged { index: usize },
    CuesChanged,
    CueNameChanged { name: String },
    MediaRegistryUpdated,
    RwffSpeedChanged { speed: f64 },
    UnsavedChanges,
    CueFired { name: String },
    ShowLoaded { path: PathBuf },
    ShowSaved { path: PathBuf },

    // Bus mirrors
    BusPositionChanged { bus: usize, pos: f64 },
    BusMediaChanged { bus: usize, media_index: u32 },
    BusActiveChanged { bus: usize, active: bool },

    // Display-only telemetry
    BusLevels { bus: usize, left: f64, right: f64 },
    CurrentRoutingChanged { row: usize, col: usize, on: bool },

    SettingsUpdated { settings: Settings },
    Error { message: String },
}

/// Runtime settings, persisted to a small JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// UDP port the telemetry listener binds on all interfaces.
    /// Changing it requires tearing down and rebinding the listener.
    pub listen_port: u16,

    /// Remote media server address. Changing it retargets the sender
    /// without a rebind.
    pub remote_host: String,
    pub remote_port: u16,

    // MIDI settings
    pub midi_enabled: bool,
    pub midi_device: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_port: 9001,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 9000,
            midi_enabled: false,
            midi_device: "MPD218".to_string(),
        }
    }
}
