use rosc::{OscMessage, OscPacket, OscType};

use crate::cue::cue::BUS_LETTERS;

/// Semantic events decoded from inbound telemetry datagrams.
#[derive(Clone, Debug, PartialEq)]
pub enum Telemetry {
    /// Playback position report for one bus. Subject to the
    /// active-bus rule before it reaches the bus mirror.
    BusPosition { bus: usize, pos: f64 },
    /// Stereo level pair for one bus. Display-only metering, never
    /// device state.
    BusLevels { bus: usize, left: f64, right: f64 },
    /// One cell of the remote's current routing matrix.
    MatrixCell { row: usize, col: usize, on: bool },
}

/// Decode an OSC packet into telemetry events. Bundles flatten in
/// order; unknown addresses and malformed argument lists are dropped
/// with a debug log.
pub fn decode(packet: OscPacket) -> Vec<Telemetry> {
    let mut events = Vec::new();
    collect(packet, &mut events);
    events
}

fn collect(packet: OscPacket, events: &mut Vec<Telemetry>) {
    match packet {
        OscPacket::Message(msg) => {
            if let Some(event) = decode_message(&msg) {
                events.push(event);
            } else {
                log::debug!("Ignoring telemetry message {}", msg.addr);
            }
        }
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                collect(inner, events);
            }
        }
    }
}

fn decode_message(msg: &OscMessage) -> Option<Telemetry> {
    let parts: Vec<&str> = msg.addr.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        ["pos", letter] => Some(Telemetry::BusPosition {
            bus: bus_index(letter)?,
            pos: as_f64(msg.args.first()?)?,
        }),
        ["db", letter] => Some(Telemetry::BusLevels {
            bus: bus_index(letter)?,
            left: as_f64(msg.args.first()?)?,
            right: as_f64(msg.args.get(1)?)?,
        }),
        ["matrix"] => Some(Telemetry::MatrixCell {
            row: as_usize(msg.args.first()?)?,
            col: as_usize(msg.args.get(1)?)?,
            on: as_bool(msg.args.get(2)?)?,
        }),
        _ => None,
    }
}

/// Bus index is the letter's ordinal position: A=0 .. E=4.
fn bus_index(letter: &str) -> Option<usize> {
    let mut chars = letter.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    BUS_LETTERS.iter().position(|&b| b == c)
}

fn as_f64(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::Float(v) => Some(*v as f64),
        OscType::Double(v) => Some(*v),
        OscType::Int(v) => Some(*v as f64),
        _ => None,
    }
}

fn as_usize(arg: &OscType) -> Option<usize> {
    match arg {
        OscType::Int(v) if *v >= 0 => Some(*v as usize),
        _ => None,
    }
}

fn as_bool(arg: &OscType) -> Option<bool> {
    match arg {
        OscType::Bool(v) => Some(*v),
        OscType::Int(v) => Some(*v != 0),
        OscType::Float(v) => Some(*v != 0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rosc::{OscBundle, OscTime};

    use super::*;

    fn message(addr: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        })
    }

    #[test]
    fn position_report_routes_by_letter() {
        let events = decode(message("/pos/C", vec![OscType::Float(33.5)]));
        assert_eq!(events, vec![Telemetry::BusPosition { bus: 2, pos: 33.5 }]);
    }

    #[test]
    fn level_report_carries_a_stereo_pair() {
        let events = decode(message(
            "/db/A",
            vec![OscType::Float(-12.0), OscType::Float(-18.0)],
        ));
        assert_eq!(
            events,
            vec![Telemetry::BusLevels {
                bus: 0,
                left: -12.0,
                right: -18.0,
            }]
        );
    }

    #[test]
    fn matrix_report_decodes_a_cell() {
        let events = decode(message(
            "/matrix",
            vec![OscType::Int(4), OscType::Int(5), OscType::Int(1)],
        ));
        assert_eq!(
            events,
            vec![Telemetry::MatrixCell {
                row: 4,
                col: 5,
                on: true,
            }]
        );
    }

    #[test]
    fn unknown_addresses_are_ignored() {
        assert!(decode(message("/quit", vec![])).is_empty());
        assert!(decode(message("/pos/Z", vec![OscType::Float(1.0)])).is_empty());
    }

    #[test]
    fn level_report_missing_an_arg_is_ignored() {
        assert!(decode(message("/db/B", vec![OscType::Float(-3.0)])).is_empty());
    }

    #[test]
    fn bundles_flatten_in_order() {
        let bundle = OscPacket::Bundle(OscBundle {
            timetag: OscTime::from((0, 0)),
            content: vec![
                message("/pos/A", vec![OscType::Float(1.0)]),
                message("/pos/B", vec![OscType::Float(2.0)]),
            ],
        });
        let events = decode(bundle);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Telemetry::BusPosition { bus: 0, pos: 1.0 });
        assert_eq!(events[1], Telemetry::BusPosition { bus: 1, pos: 2.0 });
    }
}
