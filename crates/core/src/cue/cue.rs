/// Number of playback buses on the remote media server.
pub const NUM_BUSES: usize = 5;

/// Number of audio destination channels in the routing matrix.
pub const NUM_DESTINATIONS: usize = 6;

/// Media index 0 is the blank sentinel: assigning it stops the bus.
pub const BLANK_MEDIA: u32 = 0;

/// Bus letters in wire order.
pub const BUS_LETTERS: [char; NUM_BUSES] = ['A', 'B', 'C', 'D', 'E'];

/// One entry in the media registry.
#[derive(Clone, Debug, PartialEq)]
pub struct Media {
    pub name: String,
    pub duration: f64,
}

impl Media {
    pub fn blank() -> Self {
        Self {
            name: "BLANK".to_string(),
            duration: 0.0,
        }
    }
}

/// Per-bus instruction within a cue. Every field is optional: `None`
/// means "leave this parameter unchanged on the remote device".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BusCue {
    pub media_index: Option<u32>,
    pub pos: Option<f64>,
    pub speed: Option<f64>,
    pub ramp_time: Option<f64>,
    pub zoom: Option<f64>,
    pub db: Option<f64>,
}

impl BusCue {
    pub fn is_empty(&self) -> bool {
        self.media_index.is_none()
            && self.pos.is_none()
            && self.speed.is_none()
            && self.ramp_time.is_none()
            && self.zoom.is_none()
            && self.db.is_none()
    }
}

/// Fixed 5x6 audio routing snapshot (bus -> destination channel).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoutingMatrix {
    cells: [[bool; NUM_DESTINATIONS]; NUM_BUSES],
}

impl RoutingMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bus: usize, dest: usize) -> bool {
        self.cells[bus][dest]
    }

    pub fn set(&mut self, bus: usize, dest: usize, on: bool) {
        if bus < NUM_BUSES && dest < NUM_DESTINATIONS {
            self.cells[bus][dest] = on;
        }
    }

    /// Encode all 30 cells as a flat run of "<row> <col> <0|1>" triples,
    /// row-major, space joined. This string form is shared by the cue
    /// file and the wire payload.
    pub fn encode_triples(&self) -> String {
        let mut parts = Vec::with_capacity(NUM_BUSES * NUM_DESTINATIONS * 3);
        for row in 0..NUM_BUSES {
            for col in 0..NUM_DESTINATIONS {
                parts.push(row.to_string());
                parts.push(col.to_string());
                parts.push(if self.cells[row][col] { "1" } else { "0" }.to_string());
            }
        }
        parts.join(" ")
    }

    /// Decode a whitespace-joined triple run. An empty string means all
    /// cells off; triples carry their own coordinates so any ordering
    /// is accepted. Out-of-range coordinates are dropped.
    pub fn decode_triples(input: &str) -> Self {
        let mut matrix = Self::new();
        let fields: Vec<&str> = input.split_whitespace().collect();
        for triple in fields.chunks(3) {
            if triple.len() < 3 {
                break;
            }
            let row = triple[0].parse::<usize>();
            let col = triple[1].parse::<usize>();
            let on = triple[2] != "0";
            if let (Ok(row), Ok(col)) = (row, col) {
                matrix.set(row, col, on);
            }
        }
        matrix
    }
}

/// A named snapshot of target playback and routing state for all five
/// buses, fired atomically. Identity is positional within the document.
#[derive(Clone, Debug, PartialEq)]
pub struct Cue {
    pub name: String,
    pub buses: [BusCue; NUM_BUSES],
    pub notes: String,
    pub routing: RoutingMatrix,
}

impl Cue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buses: Default::default(),
            notes: String::new(),
            routing: RoutingMatrix::new(),
        }
    }

    /// The default cue installed when a document has no other content.
    pub fn blank() -> Self {
        Self::new("BLANK")
    }
}
