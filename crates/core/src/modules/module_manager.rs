use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};

/// Owns the long-running I/O modules (telemetry listener, MIDI input)
/// and funnels everything they produce into one message channel the
/// console drains from its single control loop.
pub struct ModuleManager {
    modules: HashMap<ModuleId, Box<dyn AsyncModule>>,
    module_handles: HashMap<ModuleId, JoinHandle<()>>,
    module_senders: HashMap<ModuleId, mpsc::Sender<ModuleEvent>>,
    message_receiver: Option<mpsc::Receiver<ModuleMessage>>,
    message_sender: mpsc::Sender<ModuleMessage>,
    running: bool,
}

impl ModuleManager {
    pub fn new() -> Self {
        let (message_sender, message_receiver) = mpsc::channel(1000);

        Self {
            modules: HashMap::new(),
            module_handles: HashMap::new(),
            module_senders: HashMap::new(),
            message_receiver: Some(message_receiver),
            message_sender,
            running: false,
        }
    }

    pub fn register_module(&mut self, module: Box<dyn AsyncModule>) {
        self.modules.insert(module.id(), module);
    }

    pub async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for (id, module) in &mut self.modules {
            module
                .initialize()
                .await
                .map_err(|e| format!("Module {:?} failed to initialize: {}", id, e))?;
            log::info!("Module {:?} initialized", id);
        }
        Ok(())
    }

    /// Spawn each registered module on its own task.
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.running {
            return Err("Module manager is already running".into());
        }

        let modules_to_start = std::mem::take(&mut self.modules);
        for (id, module) in modules_to_start {
            self.spawn_module(id, module);
        }

        self.running = true;
        Ok(())
    }

    fn spawn_module(&mut self, id: ModuleId, mut module: Box<dyn AsyncModule>) {
        let (event_tx, event_rx) = mpsc::channel(1000);
        let message_tx = self.message_sender.clone();
        let module_id = id.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = module.run(event_rx, message_tx.clone()).await {
                let _ = message_tx
                    .send(ModuleMessage::Error(format!(
                        "Module {:?} error: {}",
                        module_id, e
                    )))
                    .await;
            }
        });

        self.module_handles.insert(id.clone(), handle);
        self.module_senders.insert(id, event_tx);
    }

    /// Tear down the running instance of a module (if any) and bring up
    /// a replacement. Used when a setting forces a rebind, e.g. a new
    /// telemetry listen port.
    pub async fn restart_module(
        &mut self,
        mut module: Box<dyn AsyncModule>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let id = module.id();
        if let Some(sender) = self.module_senders.remove(&id) {
            let _ = sender.send(ModuleEvent::Shutdown).await;
        }
        if let Some(handle) = self.module_handles.remove(&id) {
            if let Err(e) = handle.await {
                log::error!("Module {:?} shutdown error: {}", id, e);
            }
        }

        module
            .initialize()
            .await
            .map_err(|e| format!("Module {:?} failed to initialize: {}", id, e))?;
        self.spawn_module(id, module);
        Ok(())
    }

    pub async fn send_to_module(
        &self,
        module_id: ModuleId,
        event: ModuleEvent,
    ) -> Result<(), String> {
        let sender = self
            .module_senders
            .get(&module_id)
            .ok_or_else(|| format!("Module {:?} not found", module_id))?;
        sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event to module {:?}: {}", module_id, e))
    }

    pub async fn broadcast_event(&self, event: ModuleEvent) {
        for (id, sender) in &self.module_senders {
            if let Err(e) = sender.send(event.clone()).await {
                log::warn!("Failed to broadcast event to module {:?}: {}", id, e);
            }
        }
    }

    /// Take the shared message receiver (can only be taken once).
    pub fn take_message_receiver(&mut self) -> Option<mpsc::Receiver<ModuleMessage>> {
        self.message_receiver.take()
    }

    pub async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.running {
            return Ok(());
        }

        self.broadcast_event(ModuleEvent::Shutdown).await;

        for (id, handle) in std::mem::take(&mut self.module_handles) {
            if let Err(e) = handle.await {
                log::error!("Module {:?} shutdown error: {}", id, e);
            }
        }

        self.module_senders.clear();
        self.running = false;
        log::info!("Module manager shutdown complete");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}
