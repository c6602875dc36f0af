use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use midir::{MidiInput, MidiInputConnection};
use tokio::sync::mpsc;

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
use crate::messages::ConsoleCommand;

/// Pads repeat fast; identical notes inside this window are one press.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);

/// Per-note debounce state, owned by the listener and moved into its
/// input callback. One timestamp per note identifier.
pub struct NoteDebounce {
    window: Duration,
    last_seen: HashMap<u8, Instant>,
}

impl NoteDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// True when the note should be acted on; repeats inside the
    /// window are swallowed.
    pub fn accept(&mut self, note: u8, now: Instant) -> bool {
        match self.last_seen.get(&note) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.last_seen.insert(note, now);
                true
            }
        }
    }
}

/// Fixed note-on to action-token mapping for the pad controller.
pub fn map_note(note: u8) -> Option<ConsoleCommand> {
    match note {
        36 => Some(ConsoleCommand::Go),
        37 => Some(ConsoleCommand::PauseAll),
        38 => Some(ConsoleCommand::PlayAll),
        39 => Some(ConsoleCommand::RewindAll),
        40 => Some(ConsoleCommand::FastForwardAll),
        41 => Some(ConsoleCommand::DecrementCue),
        42 => Some(ConsoleCommand::IncrementCue),
        43 => Some(ConsoleCommand::BlankAll),
        48..=52 => Some(ConsoleCommand::PlayBus {
            bus: (note - 48) as usize,
        }),
        53..=57 => Some(ConsoleCommand::PauseBus {
            bus: (note - 53) as usize,
        }),
        _ => None,
    }
}

/// MIDI input listener: translates note-on events from the pad
/// controller into semantic commands for the console. A missing device
/// is a logged degradation, not an error.
pub struct MidiModule {
    device_name: String,
    input_connection: Option<MidiInputConnection<()>>,
    status: HashMap<String, String>,
}

impl MidiModule {
    pub fn new(device_name: String) -> Self {
        Self {
            device_name,
            input_connection: None,
            status: HashMap::new(),
        }
    }

    fn connect_midi(
        &mut self,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let midi_in = MidiInput::new("rostrum_midi_input")?;

        // Match the device port by name prefix
        let in_port = midi_in
            .ports()
            .into_iter()
            .find(|port| {
                midi_in
                    .port_name(port)
                    .map(|name| name.starts_with(&self.device_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| format!("{} input not found", self.device_name))?;

        let mut debounce = NoteDebounce::new(DEBOUNCE_WINDOW);
        let connection = midi_in
            .connect(
                &in_port,
                "rostrum-midi-input",
                move |_timestamp, message, _| {
                    // Note on with non-zero velocity only
                    if message.len() < 3 || message[0] & 0xF0 != 0x90 || message[2] == 0 {
                        return;
                    }
                    let note = message[1];
                    if !debounce.accept(note, Instant::now()) {
                        return;
                    }
                    if let Some(command) = map_note(note) {
                        // In a callback, use try_send to avoid blocking
                        // if the channel is full.
                        if let Err(e) =
                            tx.try_send(ModuleMessage::Event(ModuleEvent::Command(command)))
                        {
                            log::warn!("Failed to forward MIDI command: {}", e);
                        }
                    }
                },
                (),
            )
            .map_err(|_| "Failed to connect MIDI input")?;

        self.input_connection = Some(connection);
        self.status
            .insert("input_connected".to_string(), "true".to_string());
        self.status
            .insert("device".to_string(), self.device_name.clone());
        Ok(())
    }
}

#[async_trait]
impl AsyncModule for MidiModule {
    fn id(&self) -> ModuleId {
        ModuleId::Midi
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Initializing MIDI module for device: {}", self.device_name);
        self.status
            .insert("device_name".to_string(), self.device_name.clone());
        self.status
            .insert("input_connected".to_string(), "false".to_string());
        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.connect_midi(tx.clone()) {
            Ok(_) => {
                log::info!("MIDI device '{}' connected", self.device_name);
                let _ = tx
                    .send(ModuleMessage::Status(format!(
                        "MIDI device '{}' connected",
                        self.device_name
                    )))
                    .await;
            }
            Err(e) => {
                // Keep running without MIDI hardware.
                let error_msg =
                    format!("MIDI device '{}' unavailable: {}", self.device_name, e);
                log::error!("{}", error_msg);
                let _ = tx.send(ModuleMessage::Error(error_msg)).await;
            }
        }

        // Input arrives via the callback; this loop only waits for
        // shutdown.
        while let Some(event) = rx.recv().await {
            if let ModuleEvent::Shutdown = event {
                log::info!("MIDI module received shutdown signal");
                break;
            }
        }

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Drop the connection to close the port.
        self.input_connection = None;
        self.status
            .insert("input_connected".to_string(), "false".to_string());
        log::info!("MIDI module shutdown complete");
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rapid_repeats_of_the_same_note_are_swallowed() {
        let mut debounce = NoteDebounce::new(Duration::from_millis(150));
        let start = Instant::now();

        assert!(debounce.accept(36, start));
        assert!(!debounce.accept(36, start + Duration::from_millis(50)));
        assert!(debounce.accept(36, start + Duration::from_millis(200)));
    }

    #[test]
    fn different_notes_do_not_debounce_each_other() {
        let mut debounce = NoteDebounce::new(Duration::from_millis(150));
        let now = Instant::now();

        assert!(debounce.accept(36, now));
        assert!(debounce.accept(37, now));
    }

    #[test]
    fn note_mapping_covers_transport_and_go() {
        assert!(matches!(map_note(36), Some(ConsoleCommand::Go)));
        assert!(matches!(
            map_note(50),
            Some(ConsoleCommand::PlayBus { bus: 2 })
        ));
        assert!(matches!(
            map_note(57),
            Some(ConsoleCommand::PauseBus { bus: 4 })
        ));
        assert!(map_note(127).is_none());
    }
}
