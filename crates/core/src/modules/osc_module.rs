use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::traits::{AsyncModule, ModuleEvent, ModuleId, ModuleMessage};
use crate::protocol::decoder;

/// Inbound telemetry listener: one UDP socket bound on all interfaces,
/// decoding OSC datagrams into `Telemetry` events for the console.
///
/// Changing the listen port means shutting this module down and
/// registering a fresh one; only the remote target can change without
/// a rebind.
pub struct OscModule {
    listen_port: u16,
    socket: Option<UdpSocket>,
    datagrams_received: u64,
    status: HashMap<String, String>,
}

impl OscModule {
    pub fn new(listen_port: u16) -> Self {
        Self {
            listen_port,
            socket: None,
            datagrams_received: 0,
            status: HashMap::new(),
        }
    }

    /// The address the socket actually bound, once initialized.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

#[async_trait]
impl AsyncModule for OscModule {
    fn id(&self) -> ModuleId {
        ModuleId::Osc
    }

    async fn initialize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let bind_addr = format!("0.0.0.0:{}", self.listen_port);
        let socket = UdpSocket::bind(&bind_addr)
            .await
            .map_err(|e| format!("Failed to bind telemetry listener on {}: {}", bind_addr, e))?;

        log::info!("Telemetry listener bound on {}", socket.local_addr()?);
        self.status
            .insert("listen".to_string(), socket.local_addr()?.to_string());
        self.status
            .insert("status".to_string(), "initialized".to_string());
        self.socket = Some(socket);
        Ok(())
    }

    async fn run(
        &mut self,
        mut rx: mpsc::Receiver<ModuleEvent>,
        tx: mpsc::Sender<ModuleMessage>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let socket = self.socket.take().ok_or("OSC module not initialized")?;
        let mut buf = [0u8; 2048];
        let mut shutdown = false;

        while !shutdown {
            tokio::select! {
                // Shutdown is immediate: an in-flight receive never has
                // to complete first.
                Some(event) = rx.recv() => {
                    if let ModuleEvent::Shutdown = event {
                        log::info!("OSC module received shutdown signal");
                        shutdown = true;
                    }
                }

                result = socket.recv_from(&mut buf) => {
                    let (len, source) = match result {
                        Ok(ok) => ok,
                        Err(e) => {
                            log::warn!("Telemetry receive failed: {}", e);
                            continue;
                        }
                    };
                    self.datagrams_received += 1;

                    match rosc::decoder::decode_udp(&buf[..len]) {
                        Ok((_, packet)) => {
                            for event in decoder::decode(packet) {
                                let _ = tx
                                    .send(ModuleMessage::Event(ModuleEvent::Telemetry(event)))
                                    .await;
                            }
                        }
                        Err(e) => {
                            log::debug!("Undecodable datagram from {}: {:?}", source, e);
                        }
                    }
                }
            }
        }

        log::info!(
            "OSC module shutting down after {} datagrams",
            self.datagrams_received
        );
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.socket = None;
        self.status
            .insert("status".to_string(), "shutdown".to_string());
        Ok(())
    }

    fn status(&self) -> HashMap<String, String> {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use rosc::{OscMessage, OscPacket, OscType};

    use super::*;
    use crate::protocol::decoder::Telemetry;

    #[tokio::test]
    async fn listener_decodes_datagrams_and_shuts_down() {
        let mut module = OscModule::new(0);
        module.initialize().await.unwrap();
        let addr = module.local_addr().unwrap();

        let (event_tx, event_rx) = mpsc::channel(8);
        let (message_tx, mut message_rx) = mpsc::channel(8);
        let runner = tokio::spawn(async move {
            module.run(event_rx, message_tx).await.unwrap();
        });

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let packet = OscPacket::Message(OscMessage {
            addr: "/pos/B".to_string(),
            args: vec![OscType::Float(12.0)],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        sender
            .send_to(&bytes, ("127.0.0.1", addr.port()))
            .await
            .unwrap();

        let message = message_rx.recv().await.unwrap();
        match message {
            ModuleMessage::Event(ModuleEvent::Telemetry(event)) => {
                assert_eq!(event, Telemetry::BusPosition { bus: 1, pos: 12.0 });
            }
            other => panic!("unexpected message: {:?}", other),
        }

        event_tx.send(ModuleEvent::Shutdown).await.unwrap();
        runner.await.unwrap();
    }
}
