use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::bus::bus_state::{BusEvent, BusState};
use crate::config::ConfigManager;
use crate::cue::cue::{RoutingMatrix, NUM_BUSES};
use crate::cue::document::{CueDocument, DocumentEvent};
use crate::messages::{ConsoleCommand, ConsoleEvent, Settings};
use crate::modules::{MidiModule, ModuleEvent, ModuleManager, ModuleMessage, OscModule};
use crate::protocol::decoder::Telemetry;
use crate::protocol::encoder;
use crate::protocol::transport::OscTransport;
use crate::publisher::Publisher;
use crate::show::show_store::StorageError;

/// Transport button pressed by the operator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransportAction {
    Play,
    Pause,
    Rewind,
    FastForward,
}

/// The orchestration layer: binds semantic commands from the control
/// surface to document mutations, bus mirroring and wire sends, and
/// re-emits everything observable as `ConsoleEvent`s.
///
/// All state mutation happens on the single task driving `run`;
/// listeners marshal onto it through channels.
pub struct CueConsole {
    document: CueDocument,
    document_rx: mpsc::UnboundedReceiver<DocumentEvent>,
    bus_states: [BusState; NUM_BUSES],
    bus_rxs: Vec<mpsc::UnboundedReceiver<BusEvent>>,
    current_routing: RoutingMatrix,
    transport: Option<OscTransport>,
    config: ConfigManager,
    module_manager: ModuleManager,
    message_rx: Option<mpsc::Receiver<ModuleMessage>>,
    command_tx: mpsc::Sender<ConsoleCommand>,
    command_rx: Option<mpsc::Receiver<ConsoleCommand>>,
    events: Publisher<ConsoleEvent>,
}

impl CueConsole {
    pub fn new(config: ConfigManager) -> Self {
        let settings = config.settings().clone();

        // The console stays usable offline when the sender can't come
        // up; sends just don't happen.
        let transport = match OscTransport::new(&settings.remote_host, settings.remote_port) {
            Ok(transport) => Some(transport),
            Err(e) => {
                log::warn!("Starting offline, no OSC sender: {}", e);
                None
            }
        };

        let mut module_manager = ModuleManager::new();
        module_manager.register_module(Box::new(OscModule::new(settings.listen_port)));
        if settings.midi_enabled {
            module_manager.register_module(Box::new(MidiModule::new(settings.midi_device)));
        }

        let mut document = CueDocument::new();
        let document_rx = document.subscribe();
        let mut bus_states: [BusState; NUM_BUSES] = Default::default();
        let bus_rxs = bus_states.iter_mut().map(|b| b.subscribe()).collect();

        let (command_tx, command_rx) = mpsc::channel(100);

        Self {
            document,
            document_rx,
            bus_states,
            bus_rxs,
            current_routing: RoutingMatrix::new(),
            transport,
            config,
            module_manager,
            message_rx: None,
            command_tx,
            command_rx: Some(command_rx),
            events: Publisher::new(),
        }
    }

    /// Channel for feeding semantic commands from outside the run loop.
    pub fn commands(&self) -> mpsc::Sender<ConsoleCommand> {
        self.command_tx.clone()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ConsoleEvent> {
        self.events.subscribe()
    }

    pub fn document(&self) -> &CueDocument {
        &self.document
    }

    pub fn bus_state(&self, bus: usize) -> &BusState {
        &self.bus_states[bus]
    }

    pub fn current_routing(&self) -> &RoutingMatrix {
        &self.current_routing
    }

    /// Bring up the modules and prime the remote device into a known
    /// state. A dead transport at this point is logged, not fatal.
    pub async fn initialize(&mut self) -> Result<(), anyhow::Error> {
        self.module_manager
            .initialize()
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        self.module_manager
            .start()
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        self.message_rx = self.module_manager.take_message_receiver();

        self.blank_all();
        log::info!("Console initialized");
        Ok(())
    }

    /// Drive the console until a `Shutdown` command arrives.
    pub async fn run(&mut self) -> Result<(), anyhow::Error> {
        let mut message_rx = self
            .message_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("Console not initialized"))?;
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("Console already running"))?;

        loop {
            tokio::select! {
                Some(message) = message_rx.recv() => {
                    match message {
                        ModuleMessage::Event(ModuleEvent::Telemetry(event)) => {
                            self.handle_telemetry(event);
                        }
                        ModuleMessage::Event(ModuleEvent::Command(command)) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        ModuleMessage::Event(ModuleEvent::Shutdown) => {}
                        ModuleMessage::Status(status) => log::info!("Module status: {}", status),
                        ModuleMessage::Error(error) => {
                            log::error!("Module error: {}", error);
                            self.events.publish(ConsoleEvent::Error { message: error });
                        }
                    }
                }
                Some(command) = command_rx.recv() => {
                    if self.handle_command(command).await {
                        break;
                    }
                }
                else => break,
            }
        }

        self.module_manager
            .shutdown()
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    /// Apply one semantic command. Returns true when the console
    /// should shut down.
    pub async fn handle_command(&mut self, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Go => self.go(),
            ConsoleCommand::IncrementCue => self.document.increment_cue(),
            ConsoleCommand::DecrementCue => self.document.decrement_cue(),
            ConsoleCommand::GotoCue { index } => self.document.goto_cue(index),
            ConsoleCommand::ReplaceCurrentCue { cue } => {
                let result = self.document.replace_current_cue(cue);
                self.report_storage(result);
            }
            ConsoleCommand::InsertCueBefore { cue } => {
                let result = self.document.insert_before(cue);
                self.report_storage(result);
            }
            ConsoleCommand::InsertCueAfter { cue } => {
                let result = self.document.insert_after(cue);
                self.report_storage(result);
            }
            ConsoleCommand::InsertBlankBefore => {
                let result = self.document.insert_blank_before("BLANK");
                self.report_storage(result);
            }
            ConsoleCommand::InsertBlankAfter => {
                let result = self.document.insert_blank_after("BLANK");
                self.report_storage(result);
            }
            ConsoleCommand::DeleteCurrentCue => {
                let result = self.document.delete_current_cue();
                self.report_storage(result);
            }
            ConsoleCommand::RenameCurrentCue { name } => {
                let result = self.document.rename_current_cue(name);
                self.report_storage(result);
            }
            ConsoleCommand::SetRwffSpeed { speed } => self.document.set_rwff_speed(speed),

            ConsoleCommand::PlayBus { bus } => self.bus_transport(bus, TransportAction::Play),
            ConsoleCommand::PauseBus { bus } => self.bus_transport(bus, TransportAction::Pause),
            ConsoleCommand::RewindBus { bus } => self.bus_transport(bus, TransportAction::Rewind),
            ConsoleCommand::FastForwardBus { bus } => {
                self.bus_transport(bus, TransportAction::FastForward)
            }
            ConsoleCommand::ScrubBus { bus, pos } => self.scrub_bus(bus, pos),

            ConsoleCommand::PlayAll => self.all_transport(TransportAction::Play),
            ConsoleCommand::PauseAll => self.all_transport(TransportAction::Pause),
            ConsoleCommand::RewindAll => self.all_transport(TransportAction::Rewind),
            ConsoleCommand::FastForwardAll => self.all_transport(TransportAction::FastForward),
            ConsoleCommand::BlankAll => self.blank_all(),
            ConsoleCommand::Transport { token } => {
                self.send_state(&encoder::encode_transport(&token))
            }

            ConsoleCommand::LoadShow { path } => self.load_show(path),
            ConsoleCommand::SaveShowAs { path } => {
                let result = self.document.save_as(&path);
                if result.is_ok() {
                    self.events.publish(ConsoleEvent::ShowSaved { path });
                }
                self.report_storage(result);
            }
            ConsoleCommand::UpdateMediaRegistry { entries } => {
                let result = self.document.update_media_registry(entries);
                self.report_storage(result);
            }

            ConsoleCommand::UpdateSettings { settings } => self.apply_settings(settings).await,

            ConsoleCommand::Shutdown => return true,
        }
        self.forward_document_events();
        self.forward_bus_events();
        false
    }

    /// The atomic GO action: encode and transmit the current cue,
    /// mirror its bus entries and advance the cursor.
    pub fn go(&mut self) {
        let cue = self.document.current_cue().clone();
        let (name, payload) = self.document.fire_current_cue(true);

        for (bus, entry) in self.bus_states.iter_mut().zip(cue.buses.iter()) {
            bus.set_from_cue(entry.media_index, entry.pos, entry.speed);
        }

        self.send_state(&payload);
        if let Some(transport) = &self.transport {
            transport.send_cue_name(&name);
        }
        self.events.publish(ConsoleEvent::CueFired { name });
        self.forward_document_events();
        self.forward_bus_events();
    }

    /// Speed to command for one bus, or None when the command is
    /// suppressed because the bus is inactive.
    fn speed_target(&self, bus: usize, action: TransportAction) -> Option<f64> {
        if !self.bus_states[bus].active() {
            return None;
        }
        let rwff = self.document.rwff_speed();
        Some(match action {
            TransportAction::Play => self.bus_states[bus].speed(),
            TransportAction::Pause => 0.0,
            TransportAction::Rewind => -rwff,
            TransportAction::FastForward => rwff,
        })
    }

    /// All-bus variant: each active bus's own last commanded speed,
    /// scaled by the rwff multiplier for rewind/fast-forward.
    fn all_speed_targets(&self, action: TransportAction) -> [Option<f64>; NUM_BUSES] {
        let rwff = self.document.rwff_speed();
        let mut targets = [None; NUM_BUSES];
        for (bus, target) in targets.iter_mut().enumerate() {
            if !self.bus_states[bus].active() {
                continue;
            }
            let speed = self.bus_states[bus].speed();
            *target = Some(match action {
                TransportAction::Play => speed,
                TransportAction::Pause => 0.0,
                TransportAction::Rewind => speed * -rwff,
                TransportAction::FastForward => speed * rwff,
            });
        }
        targets
    }

    fn bus_transport(&mut self, bus: usize, action: TransportAction) {
        match self.speed_target(bus, action) {
            Some(speed) => self.send_state(&encoder::encode_bus_speed(bus, speed)),
            None => log::debug!("Transport {:?} suppressed, bus {} inactive", action, bus),
        }
    }

    fn all_transport(&mut self, action: TransportAction) {
        let targets = self.all_speed_targets(action);
        self.send_state(&encoder::encode_all_speeds(&targets));
    }

    /// Operator scrub: wire send plus local mirror, both gated on the
    /// bus being active.
    fn scrub_bus(&mut self, bus: usize, pos: f64) {
        if !self.bus_states[bus].active() {
            return;
        }
        self.send_state(&encoder::encode_scrub(bus, pos));
        self.bus_states[bus].set_pos(pos);
        self.forward_bus_events();
    }

    /// Stop every bus and clear the mirrors. Fired once at startup so
    /// the remote state is known.
    fn blank_all(&mut self) {
        self.send_state(&encoder::encode_blank_all());
        for bus in self.bus_states.iter_mut() {
            bus.set_from_cue(Some(0), None, None);
        }
        self.forward_bus_events();
    }

    fn handle_telemetry(&mut self, event: Telemetry) {
        match event {
            Telemetry::BusPosition { bus, pos } => {
                if bus < NUM_BUSES {
                    self.bus_states[bus].set_pos(pos);
                    self.forward_bus_events();
                }
            }
            Telemetry::BusLevels { bus, left, right } => {
                self.events
                    .publish(ConsoleEvent::BusLevels { bus, left, right });
            }
            Telemetry::MatrixCell { row, col, on } => {
                self.current_routing.set(row, col, on);
                self.events
                    .publish(ConsoleEvent::CurrentRoutingChanged { row, col, on });
            }
        }
    }

    async fn apply_settings(&mut self, settings: Settings) {
        let previous = self.config.settings().clone();
        if let Err(e) = self.config.update_settings(settings.clone()) {
            self.events.publish(ConsoleEvent::Error {
                message: e.to_string(),
            });
            return;
        }

        // Retargeting the sender never needs a rebind.
        if settings.remote_host != previous.remote_host
            || settings.remote_port != previous.remote_port
        {
            let result = match &mut self.transport {
                Some(transport) => {
                    transport.set_remote(&settings.remote_host, settings.remote_port)
                }
                None => match OscTransport::new(&settings.remote_host, settings.remote_port) {
                    Ok(transport) => {
                        self.transport = Some(transport);
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
            };
            if let Err(e) = result {
                self.events.publish(ConsoleEvent::Error {
                    message: e.to_string(),
                });
            }
        }

        // A new listen port needs a fresh socket.
        if settings.listen_port != previous.listen_port && self.module_manager.is_running() {
            if let Err(e) = self
                .module_manager
                .restart_module(Box::new(OscModule::new(settings.listen_port)))
                .await
            {
                self.events.publish(ConsoleEvent::Error {
                    message: format!("Failed to rebind telemetry listener: {}", e),
                });
            }
        }

        self.events.publish(ConsoleEvent::SettingsUpdated { settings });
    }

    fn load_show(&mut self, path: PathBuf) {
        match CueDocument::open(&path) {
            Ok(mut document) => {
                self.document_rx = document.subscribe();
                self.document = document;
                self.events.publish(ConsoleEvent::ShowLoaded { path });
                self.events.publish(ConsoleEvent::CuesChanged);
                self.events.publish(ConsoleEvent::CuePointerChanged {
                    index: self.document.cue_pointer(),
                });
                self.events.publish(ConsoleEvent::MediaRegistryUpdated);
            }
            Err(e) => self.events.publish(ConsoleEvent::Error {
                message: e.to_string(),
            }),
        }
    }

    fn send_state(&mut self, fields: &[String]) {
        if let Some(transport) = &self.transport {
            transport.send_state(fields);
        }
    }

    fn report_storage(&mut self, result: Result<(), StorageError>) {
        if let Err(e) = result {
            log::error!("{}", e);
            self.events.publish(ConsoleEvent::Error {
                message: e.to_string(),
            });
        }
    }

    /// Drain and translate document notifications. Mutations only
    /// happen on this task, so draining right after an operation is
    /// complete.
    fn forward_document_events(&mut self) {
        while let Ok(event) = self.document_rx.try_recv() {
            let mapped = match event {
                DocumentEvent::CuePointer => ConsoleEvent::CuePointerChanged {
                    index: self.document.cue_pointer(),
                },
                DocumentEvent::Cues => ConsoleEvent::CuesChanged,
                DocumentEvent::CueName => ConsoleEvent::CueNameChanged {
                    name: self.document.current_cue().name.clone(),
                },
                DocumentEvent::MediaRegistry => ConsoleEvent::MediaRegistryUpdated,
                DocumentEvent::RwffSpeed => ConsoleEvent::RwffSpeedChanged {
                    speed: self.document.rwff_speed(),
                },
                DocumentEvent::UnsavedChanges => ConsoleEvent::UnsavedChanges,
            };
            self.events.publish(mapped);
        }
    }

    fn forward_bus_events(&mut self) {
        for (bus, rx) in self.bus_rxs.iter_mut().enumerate() {
            while let Ok(event) = rx.try_recv() {
                let mapped = match event {
                    BusEvent::Position(pos) => ConsoleEvent::BusPositionChanged { bus, pos },
                    BusEvent::Media(media_index) => {
                        ConsoleEvent::BusMediaChanged { bus, media_index }
                    }
                    BusEvent::Active(active) => ConsoleEvent::BusActiveChanged { bus, active },
                };
                self.events.publish(mapped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::cue::cue::{BusCue, Cue};

    fn offline_console() -> (CueConsole, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = ConfigManager::new(Some(dir.path().join("settings.json")));
        let mut console = CueConsole::new(config);
        // Keep tests off the network.
        console.transport = None;
        (console, dir)
    }

    fn cue_with_bus(bus: usize, media: u32, speed: f64) -> Cue {
        let mut cue = Cue::new("test");
        cue.buses[bus] = BusCue {
            media_index: Some(media),
            pos: Some(0.0),
            speed: Some(speed),
            ramp_time: Some(0.0),
            zoom: None,
            db: None,
        };
        cue
    }

    #[tokio::test]
    async fn go_mirrors_the_fired_cue_into_bus_states() {
        let (mut console, _dir) = offline_console();
        console
            .document
            .replace_current_cue(cue_with_bus(1, 3, 1.5))
            .unwrap();

        console.go();

        assert!(console.bus_state(1).active());
        assert_eq!(console.bus_state(1).media_index(), 3);
        assert_eq!(console.bus_state(1).speed(), 1.5);
        assert!(!console.bus_state(0).active());
    }

    #[tokio::test]
    async fn go_advances_the_cursor_with_wraparound() {
        let (mut console, _dir) = offline_console();
        console.go();
        assert_eq!(console.document().cue_pointer(), 0);

        console.document.insert_after(Cue::new("two")).unwrap();
        console.document.goto_cue(1);
        console.go();
        assert_eq!(console.document().cue_pointer(), 0);
    }

    #[tokio::test]
    async fn transport_targets_follow_the_rwff_multiplier() {
        let (mut console, _dir) = offline_console();
        console
            .document
            .replace_current_cue(cue_with_bus(0, 2, 1.0))
            .unwrap();
        console.go();
        console.document.set_rwff_speed(4.0);

        assert_eq!(console.speed_target(0, TransportAction::Play), Some(1.0));
        assert_eq!(console.speed_target(0, TransportAction::Pause), Some(0.0));
        assert_eq!(console.speed_target(0, TransportAction::Rewind), Some(-4.0));
        assert_eq!(
            console.speed_target(0, TransportAction::FastForward),
            Some(4.0)
        );
    }

    #[tokio::test]
    async fn transport_on_inactive_bus_is_suppressed() {
        let (console, _dir) = offline_console();
        assert_eq!(console.speed_target(2, TransportAction::Play), None);
    }

    #[tokio::test]
    async fn all_bus_targets_scale_each_active_speed() {
        let (mut console, _dir) = offline_console();
        let mut cue = cue_with_bus(0, 2, 1.0);
        cue.buses[3] = BusCue {
            media_index: Some(5),
            pos: Some(10.0),
            speed: Some(-0.5),
            ramp_time: Some(0.0),
            zoom: None,
            db: None,
        };
        console.document.replace_current_cue(cue).unwrap();
        console.go();

        let targets = console.all_speed_targets(TransportAction::FastForward);
        assert_eq!(targets[0], Some(2.0));
        assert_eq!(targets[1], None);
        assert_eq!(targets[3], Some(-1.0));
    }

    #[tokio::test]
    async fn blank_media_in_a_fired_cue_clears_the_bus() {
        let (mut console, _dir) = offline_console();
        console
            .document
            .replace_current_cue(cue_with_bus(0, 2, 1.0))
            .unwrap();
        console.go();
        assert!(console.bus_state(0).active());

        console.document.goto_cue(0);
        console
            .document
            .replace_current_cue(cue_with_bus(0, 0, 0.0))
            .unwrap();
        console.go();
        assert!(!console.bus_state(0).active());
        assert_eq!(console.bus_state(0).pos(), 0.0);
    }

    #[tokio::test]
    async fn telemetry_position_respects_the_active_rule() {
        let (mut console, _dir) = offline_console();
        console.handle_telemetry(Telemetry::BusPosition { bus: 0, pos: 42.0 });
        assert_eq!(console.bus_state(0).pos(), 0.0);

        console
            .document
            .replace_current_cue(cue_with_bus(0, 1, 1.0))
            .unwrap();
        console.go();
        console.handle_telemetry(Telemetry::BusPosition { bus: 0, pos: 42.0 });
        assert_eq!(console.bus_state(0).pos(), 42.0);
    }

    #[tokio::test]
    async fn matrix_telemetry_updates_the_current_routing_snapshot() {
        let (mut console, _dir) = offline_console();
        console.handle_telemetry(Telemetry::MatrixCell {
            row: 2,
            col: 4,
            on: true,
        });
        assert!(console.current_routing().get(2, 4));
    }

    #[tokio::test]
    async fn commands_emit_console_events() {
        let (mut console, _dir) = offline_console();
        let mut rx = console.subscribe();

        console
            .handle_command(ConsoleCommand::RenameCurrentCue {
                name: "opening".to_string(),
            })
            .await;

        let mut saw_name_change = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ConsoleEvent::CueNameChanged { .. }) {
                saw_name_change = true;
            }
        }
        assert!(saw_name_change);
    }

    #[tokio::test]
    async fn shutdown_command_stops_the_console() {
        let (mut console, _dir) = offline_console();
        assert!(console.handle_command(ConsoleCommand::Shutdown).await);
        assert!(!console.handle_command(ConsoleCommand::Go).await);
    }
}
