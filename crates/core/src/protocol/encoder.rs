use crate::cue::cue::{Cue, NUM_BUSES};

/// Fields per bus in the remote device's positional state array:
/// media, pos, speed+ramp, zoom, reserved, db, trailing.
pub const FIELDS_PER_BUS: usize = 7;

/// Positional offset of the position field within a bus block.
pub const FIELD_POS: usize = 1;

/// Positional offset of the combined speed/ramp field within a bus block.
pub const FIELD_SPEED: usize = 2;

/// Null sentinel on the wire.
const NULL: &str = "n";

fn fmt_num(value: f64) -> String {
    format!("{}", value)
}

/// Speed and ramp always carry a decimal point on the wire, so `1.0`
/// stays "1.0" rather than collapsing to "1".
fn fmt_speed(value: f64) -> String {
    format!("{:?}", value)
}

fn opt_u32(value: Option<u32>) -> String {
    value.map_or_else(|| NULL.to_string(), |v| v.to_string())
}

fn opt_num(value: Option<f64>) -> String {
    value.map_or_else(|| NULL.to_string(), fmt_num)
}

/// Encode a whole cue as the flat positional field array the remote
/// device consumes: 7 fields per bus in A..E order, 5 filler fields,
/// then the routing matrix as one triple-run string. 41 fields total.
pub fn encode_cue_state(cue: &Cue) -> Vec<String> {
    let mut fields = Vec::with_capacity(NUM_BUSES * FIELDS_PER_BUS + NUM_BUSES + 1);
    for bus in &cue.buses {
        fields.push(opt_u32(bus.media_index));
        fields.push(opt_num(bus.pos));
        // Speed and ramp travel as one field; the pair is null exactly
        // when speed is null. A missing ramp next to a set speed means
        // "no ramp", i.e. zero.
        match bus.speed {
            Some(speed) => fields.push(format!(
                "{} {}",
                fmt_speed(speed),
                fmt_speed(bus.ramp_time.unwrap_or(0.0))
            )),
            None => fields.push(NULL.to_string()),
        }
        fields.push(opt_num(bus.zoom));
        fields.push(NULL.to_string());
        fields.push(opt_num(bus.db));
        fields.push(NULL.to_string());
    }
    for _ in 0..NUM_BUSES {
        fields.push(" ".to_string());
    }
    fields.push(cue.routing.encode_triples());
    fields
}

/// The startup priming payload: media 0 on every bus, everything else
/// null. Guarantees a known remote state before the first cue fires.
pub fn encode_blank_all() -> Vec<String> {
    let mut fields = Vec::with_capacity(NUM_BUSES * FIELDS_PER_BUS);
    for _ in 0..NUM_BUSES {
        fields.push("0".to_string());
        for _ in 1..FIELDS_PER_BUS {
            fields.push(NULL.to_string());
        }
    }
    fields
}

/// Degenerate transport command: an opaque token plus a fixed "1" flag.
pub fn encode_transport(token: &str) -> Vec<String> {
    vec![token.to_string(), "1".to_string()]
}

/// Sparse single-field update: `bus * 7 + field` leading nulls with the
/// target value as the final element. The remote device treats a short
/// array as "everything past the given fields is unchanged".
pub fn encode_single_field(bus: usize, field: usize, value: String) -> Vec<String> {
    let offset = bus * FIELDS_PER_BUS + field;
    let mut fields = vec![NULL.to_string(); offset];
    fields.push(value);
    fields
}

/// Direct position scrub on one bus.
pub fn encode_scrub(bus: usize, pos: f64) -> Vec<String> {
    encode_single_field(bus, FIELD_POS, fmt_num(pos))
}

/// Immediate speed change on one bus. No ramp component: the remote
/// reads a bare speed as ramp zero.
pub fn encode_bus_speed(bus: usize, speed: f64) -> Vec<String> {
    encode_single_field(bus, FIELD_SPEED, fmt_speed(speed))
}

/// Combined speed update for several buses at once. Buses with `None`
/// stay null; the array ends right after the last addressed field.
/// Returns an empty array when no bus is addressed.
pub fn encode_all_speeds(speeds: &[Option<f64>; NUM_BUSES]) -> Vec<String> {
    let last = match speeds.iter().rposition(|s| s.is_some()) {
        Some(last) => last,
        None => return Vec::new(),
    };
    let mut fields = vec![NULL.to_string(); last * FIELDS_PER_BUS + FIELD_SPEED + 1];
    for (bus, speed) in speeds.iter().enumerate() {
        if let Some(speed) = speed {
            fields[bus * FIELDS_PER_BUS + FIELD_SPEED] = fmt_speed(*speed);
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cue::cue::BusCue;

    #[test]
    fn fire_cue_payload_shape() {
        let mut cue = Cue::new("shape");
        cue.buses[0] = BusCue {
            media_index: Some(1),
            pos: Some(50.0),
            speed: Some(1.0),
            ramp_time: Some(2.0),
            zoom: Some(100.0),
            db: Some(0.0),
        };

        let fields = encode_cue_state(&cue);
        assert_eq!(fields.len(), 35 + 5 + 1);
        assert_eq!(
            &fields[..7],
            &["1", "50", "1.0 2.0", "100", "n", "0", "n"]
        );
        assert!(fields[7..35].iter().all(|f| f == "n"));
        assert!(fields[35..40].iter().all(|f| f == " "));
        assert_eq!(fields[40].split_whitespace().count(), 90);
    }

    #[test]
    fn speed_without_ramp_encodes_ramp_zero() {
        let mut cue = Cue::new("noramp");
        cue.buses[2].speed = Some(-1.5);
        let fields = encode_cue_state(&cue);
        assert_eq!(fields[2 * FIELDS_PER_BUS + FIELD_SPEED], "-1.5 0.0");
    }

    #[test]
    fn blank_all_stops_every_bus() {
        let fields = encode_blank_all();
        assert_eq!(fields.len(), 35);
        for bus in 0..NUM_BUSES {
            assert_eq!(fields[bus * FIELDS_PER_BUS], "0");
            assert!(fields[bus * FIELDS_PER_BUS + 1..(bus + 1) * FIELDS_PER_BUS]
                .iter()
                .all(|f| f == "n"));
        }
    }

    #[test]
    fn transport_is_token_plus_flag() {
        assert_eq!(encode_transport("resync"), ["resync", "1"]);
    }

    #[test]
    fn scrub_addresses_the_position_offset() {
        let fields = encode_scrub(3, 75.0);
        assert_eq!(fields.len(), 3 * 7 + 1 + 1);
        assert!(fields[..fields.len() - 1].iter().all(|f| f == "n"));
        assert_eq!(fields.last().unwrap(), "75");
    }

    #[test]
    fn bus_speed_addresses_the_speed_offset() {
        let fields = encode_bus_speed(0, 0.0);
        assert_eq!(fields, ["n", "n", "0.0"]);
    }

    #[test]
    fn all_speeds_skips_inactive_buses() {
        let speeds = [Some(2.0), None, Some(-2.0), None, None];
        let fields = encode_all_speeds(&speeds);
        assert_eq!(fields.len(), 2 * 7 + 2 + 1);
        assert_eq!(fields[2], "2.0");
        assert_eq!(fields[9], "n");
        assert_eq!(fields[16], "-2.0");
    }

    #[test]
    fn all_speeds_with_no_buses_is_empty() {
        assert!(encode_all_speeds(&[None; NUM_BUSES]).is_empty());
    }
}
