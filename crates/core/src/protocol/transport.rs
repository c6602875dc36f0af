use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rosc::{OscMessage, OscPacket, OscType};

/// Outbound OSC address for the positional state array.
pub const STATE_ADDR: &str = "/cue/state";

/// Outbound OSC address announcing a fired cue's name.
pub const NAME_ADDR: &str = "/cue/name";

/// Fire-and-forget OSC sender to the remote media server.
///
/// Sends are at-most-once with no acknowledgement. Failures are logged
/// and absorbed here so the console keeps working offline.
pub struct OscTransport {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl OscTransport {
    pub fn new(remote_host: &str, remote_port: u16) -> Result<Self, TransportError> {
        let remote = resolve(remote_host, remote_port)?;
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| TransportError::BindError(e.to_string()))?;
        Ok(Self { socket, remote })
    }

    /// Retarget without rebinding; only the listen side needs a rebind
    /// when settings change.
    pub fn set_remote(&mut self, remote_host: &str, remote_port: u16) -> Result<(), TransportError> {
        self.remote = resolve(remote_host, remote_port)?;
        Ok(())
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Send a positional field array. An empty array means the command
    /// was suppressed upstream; nothing goes on the wire.
    pub fn send_state(&self, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        let args = fields
            .iter()
            .map(|f| OscType::String(f.clone()))
            .collect();
        self.send_message(STATE_ADDR, args);
    }

    pub fn send_cue_name(&self, name: &str) {
        self.send_message(NAME_ADDR, vec![OscType::String(name.to_string())]);
    }

    fn send_message(&self, addr: &str, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let bytes = match rosc::encoder::encode(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("Failed to encode OSC message {}: {:?}", addr, e);
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&bytes, self.remote) {
            log::warn!("OSC send to {} failed: {}", self.remote, e);
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TransportError::AddressError(format!("{}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| TransportError::AddressError(format!("{}:{} resolved to nothing", host, port)))
}

/// Transport error taxonomy. Never fatal: callers degrade to offline
/// operation.
#[derive(Debug)]
pub enum TransportError {
    BindError(String),
    AddressError(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::BindError(msg) => write!(f, "Failed to bind OSC socket: {}", msg),
            TransportError::AddressError(msg) => write!(f, "Bad OSC destination: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_message_round_trips_over_loopback() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        let transport = OscTransport::new("127.0.0.1", port).unwrap();

        transport.send_state(&["1".to_string(), "n".to_string()]);

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, STATE_ADDR);
                assert_eq!(
                    msg.args,
                    vec![
                        OscType::String("1".to_string()),
                        OscType::String("n".to_string())
                    ]
                );
            }
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn empty_state_array_sends_nothing() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        let transport = OscTransport::new("127.0.0.1", port).unwrap();

        transport.send_state(&[]);

        receiver
            .set_read_timeout(Some(std::time::Duration::from_millis(50)))
            .unwrap();
        let mut buf = [0u8; 64];
        assert!(receiver.recv_from(&mut buf).is_err());
    }

    #[test]
    fn unresolvable_host_is_an_address_error() {
        assert!(matches!(
            OscTransport::new("definitely.not.a.real.host.invalid", 9000),
            Err(TransportError::AddressError(_))
        ));
    }
}
