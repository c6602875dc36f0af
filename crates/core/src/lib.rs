pub use bus::bus_state::{BusEvent, BusState};
pub use config::{ConfigError, ConfigFile, ConfigManager};
pub use console::{CueConsole, TransportAction};
pub use cue::cue::{
    BusCue, Cue, Media, RoutingMatrix, BLANK_MEDIA, BUS_LETTERS, NUM_BUSES, NUM_DESTINATIONS,
};
pub use cue::document::{CueDocument, DocumentEvent};
pub use messages::{ConsoleCommand, ConsoleEvent, Settings};
// Async module system exports
pub use modules::{
    AsyncModule, MidiModule, ModuleEvent, ModuleId, ModuleManager, ModuleMessage, OscModule,
};
pub use protocol::decoder::{self, Telemetry};
pub use protocol::encoder;
pub use protocol::transport::{OscTransport, TransportError};
pub use publisher::Publisher;
pub use show::show_store::{ShowStore, StorageError};

mod bus;
mod config;
mod console;
mod cue;
pub mod messages;
mod modules;
mod protocol;
mod publisher;
mod show;
