use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::cue::cue::{BusCue, Cue, Media, RoutingMatrix, NUM_BUSES};

const CUE_FILE: &str = "cues.csv";
const MEDIA_FILE: &str = "mediainfo.txt";
const BACKUP_DIR: &str = "backups";

/// Column layout: name + 6 fields per bus x 5 buses + notes + matrix.
const CUE_COLUMNS: usize = 1 + NUM_BUSES * 6 + 2;

const CUE_HEADER: [&str; CUE_COLUMNS] = [
    "Cue", "A media", "A pos", "A speed", "A ramp", "A zoom", "A db", "B media", "B pos",
    "B speed", "B ramp", "B zoom", "B db", "C media", "C pos", "C speed", "C ramp", "C zoom",
    "C db", "D media", "D pos", "D speed", "D ramp", "D zoom", "D db", "E media", "E pos",
    "E speed", "E ramp", "E zoom", "E db", "Notes", "Matrix",
];

lazy_static! {
    static ref MEDIA_LINE: Regex = Regex::new(r#"^(\d+), "([^"]+)" ([\d.]+);"#).unwrap();
}

/// Durable storage for a show folder: `cues.csv`, `mediainfo.txt` and a
/// `backups/` area that receives the previous cue file before every
/// overwrite.
pub struct ShowStore {
    folder: PathBuf,
}

impl ShowStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn cue_path(&self) -> PathBuf {
        self.folder.join(CUE_FILE)
    }

    fn media_path(&self) -> PathBuf {
        self.folder.join(MEDIA_FILE)
    }

    fn backup_dir(&self) -> PathBuf {
        self.folder.join(BACKUP_DIR)
    }

    /// Create the show folder and its backup area if absent.
    pub fn create(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.backup_dir())
            .map_err(|e| StorageError::WriteError(format!("{}: {}", self.folder.display(), e)))?;
        Ok(())
    }

    pub fn load_cues(&self) -> Result<Vec<Cue>, StorageError> {
        let path = self.cue_path();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| StorageError::ReadError(format!("{}: {}", path.display(), e)))?;

        let mut cues = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| StorageError::ReadError(format!("{}: {}", path.display(), e)))?;
            cues.push(decode_cue_record(&record)?);
        }
        Ok(cues)
    }

    /// Rotate the existing cue file into the backup area, then write a
    /// header row followed by one row per cue.
    pub fn write_cues(&self, cues: &[Cue]) -> Result<(), StorageError> {
        let path = self.cue_path();
        self.rotate_backup(&path)?;

        let mut writer = csv::Writer::from_path(&path)
            .map_err(|e| StorageError::WriteError(format!("{}: {}", path.display(), e)))?;
        writer
            .write_record(CUE_HEADER)
            .map_err(|e| StorageError::WriteError(e.to_string()))?;
        for cue in cues {
            writer
                .write_record(encode_cue_record(cue))
                .map_err(|e| StorageError::WriteError(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| StorageError::WriteError(e.to_string()))?;
        Ok(())
    }

    fn rotate_backup(&self, cue_path: &Path) -> Result<(), StorageError> {
        if !cue_path.exists() {
            return Ok(());
        }
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir)
            .map_err(|e| StorageError::WriteError(format!("{}: {}", backup_dir.display(), e)))?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let backup_path = backup_dir.join(format!("cues-{}.csv", stamp));
        fs::rename(cue_path, &backup_path)
            .map_err(|e| StorageError::WriteError(format!("{}: {}", backup_path.display(), e)))?;
        Ok(())
    }

    /// Load the media registry. Malformed lines are skipped with a
    /// warning; index 0 is always forced to BLANK afterwards.
    pub fn load_media(&self) -> Result<BTreeMap<u32, Media>, StorageError> {
        let path = self.media_path();
        let content = fs::read_to_string(&path)
            .map_err(|e| StorageError::ReadError(format!("{}: {}", path.display(), e)))?;

        let mut registry = BTreeMap::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_media_line(line) {
                Some((index, media)) => {
                    registry.insert(index, media);
                }
                None => log::warn!("Skipping malformed media registry line: {:?}", line),
            }
        }
        registry.insert(0, Media::blank());
        Ok(registry)
    }

    pub fn write_media(&self, registry: &BTreeMap<u32, Media>) -> Result<(), StorageError> {
        let path = self.media_path();
        let mut content = String::new();
        for (index, media) in registry {
            content.push_str(&format!("{}, \"{}\" {};\n", index, media.name, media.duration));
        }
        fs::write(&path, content)
            .map_err(|e| StorageError::WriteError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

fn parse_media_line(line: &str) -> Option<(u32, Media)> {
    let caps = MEDIA_LINE.captures(line)?;
    let index = caps[1].parse::<u32>().ok()?;
    let name = caps[2].to_string();
    let duration = caps[3].parse::<f64>().ok()?;
    Some((index, Media { name, duration }))
}

fn encode_opt_u32(value: Option<u32>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "n".to_string(),
    }
}

fn encode_opt_f64(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "n".to_string(),
    }
}

fn encode_cue_record(cue: &Cue) -> Vec<String> {
    let mut record = Vec::with_capacity(CUE_COLUMNS);
    record.push(cue.name.clone());
    for bus in &cue.buses {
        record.push(encode_opt_u32(bus.media_index));
        record.push(encode_opt_f64(bus.pos));
        record.push(encode_opt_f64(bus.speed));
        record.push(encode_opt_f64(bus.ramp_time));
        record.push(encode_opt_f64(bus.zoom));
        record.push(encode_opt_f64(bus.db));
    }
    record.push(cue.notes.clone());
    record.push(cue.routing.encode_triples());
    record
}

fn decode_opt_u32(field: &str) -> Result<Option<u32>, StorageError> {
    if field == "n" {
        return Ok(None);
    }
    field
        .parse::<u32>()
        .map(Some)
        .map_err(|_| StorageError::ParseError(format!("bad media index {:?}", field)))
}

fn decode_opt_f64(field: &str) -> Result<Option<f64>, StorageError> {
    if field == "n" {
        return Ok(None);
    }
    field
        .parse::<f64>()
        .map(Some)
        .map_err(|_| StorageError::ParseError(format!("bad numeric field {:?}", field)))
}

fn decode_cue_record(record: &csv::StringRecord) -> Result<Cue, StorageError> {
    if record.len() != CUE_COLUMNS {
        return Err(StorageError::ParseError(format!(
            "expected {} columns, got {}",
            CUE_COLUMNS,
            record.len()
        )));
    }

    let mut cue = Cue::new(&record[0]);
    for (i, bus) in cue.buses.iter_mut().enumerate() {
        let base = 1 + i * 6;
        *bus = BusCue {
            media_index: decode_opt_u32(&record[base])?,
            pos: decode_opt_f64(&record[base + 1])?,
            speed: decode_opt_f64(&record[base + 2])?,
            ramp_time: decode_opt_f64(&record[base + 3])?,
            zoom: decode_opt_f64(&record[base + 4])?,
            db: decode_opt_f64(&record[base + 5])?,
        };
    }
    cue.notes = record[CUE_COLUMNS - 2].to_string();
    cue.routing = RoutingMatrix::decode_triples(&record[CUE_COLUMNS - 1]);
    Ok(cue)
}

/// Storage error taxonomy: missing/unreadable files, unwritable files,
/// and structurally malformed rows. Never silently defaulted.
#[derive(Debug)]
pub enum StorageError {
    ReadError(String),
    WriteError(String),
    ParseError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ReadError(msg) => write!(f, "Failed to read show file: {}", msg),
            StorageError::WriteError(msg) => write!(f, "Failed to write show file: {}", msg),
            StorageError::ParseError(msg) => write!(f, "Malformed show file: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn full_cue() -> Cue {
        let mut cue = Cue::new("Full");
        for (i, bus) in cue.buses.iter_mut().enumerate() {
            *bus = BusCue {
                media_index: Some(i as u32 + 1),
                pos: Some(12.5 * i as f64),
                speed: Some(1.0),
                ramp_time: Some(2.0),
                zoom: Some(100.0),
                db: Some(-6.0),
            };
        }
        cue.notes = "they were waiting, at the table".to_string();
        cue.routing.set(0, 0, true);
        cue.routing.set(4, 5, true);
        cue
    }

    fn mixed_cue() -> Cue {
        let mut cue = Cue::new("Mixed");
        cue.buses[1].media_index = Some(3);
        cue.buses[1].pos = Some(50.0);
        cue.buses[3].speed = Some(-1.5);
        cue.buses[3].ramp_time = Some(0.0);
        cue.routing.set(2, 3, true);
        cue
    }

    #[test]
    fn cues_round_trip_through_csv() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();

        let cues = vec![Cue::blank(), full_cue(), mixed_cue()];
        store.write_cues(&cues).unwrap();
        let loaded = store.load_cues().unwrap();

        assert_eq!(loaded, cues);
    }

    #[test]
    fn overwrite_rotates_previous_file_into_backups() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();

        store.write_cues(&[Cue::blank()]).unwrap();
        store.write_cues(&[full_cue()]).unwrap();

        let backups: Vec<_> = fs::read_dir(dir.path().join(BACKUP_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("cues-"));
        assert!(backups[0].ends_with(".csv"));
    }

    #[test]
    fn missing_cue_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        assert!(matches!(
            store.load_cues(),
            Err(StorageError::ReadError(_))
        ));
    }

    #[test]
    fn wrong_column_count_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();
        fs::write(
            dir.path().join(CUE_FILE),
            "Cue,A media\nBad,1\n",
        )
        .unwrap();
        assert!(matches!(
            store.load_cues(),
            Err(StorageError::ParseError(_))
        ));
    }

    #[test]
    fn unparsable_number_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();
        store.write_cues(&[full_cue()]).unwrap();
        // Corrupt one numeric field in place.
        let content = fs::read_to_string(dir.path().join(CUE_FILE)).unwrap();
        fs::write(
            dir.path().join(CUE_FILE),
            content.replacen("12.5", "oops", 1),
        )
        .unwrap();
        assert!(matches!(
            store.load_cues(),
            Err(StorageError::ParseError(_))
        ));
    }

    #[test]
    fn media_registry_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();

        let mut registry = BTreeMap::new();
        registry.insert(0, Media::blank());
        registry.insert(
            1,
            Media {
                name: "ISNR".to_string(),
                duration: 323.5,
            },
        );
        registry.insert(
            2,
            Media {
                name: "TOKYO".to_string(),
                duration: 61.0,
            },
        );

        store.write_media(&registry).unwrap();
        assert_eq!(store.load_media().unwrap(), registry);
    }

    #[test]
    fn malformed_media_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();
        fs::write(
            dir.path().join(MEDIA_FILE),
            "1, \"ISNR\" 323.5;\nthis is not a media line\n2, \"TBH\" 12;\n",
        )
        .unwrap();

        let registry = store.load_media().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry[&0], Media::blank());
        assert_eq!(registry[&1].name, "ISNR");
        assert_eq!(registry[&2].duration, 12.0);
    }

    #[test]
    fn blank_entry_survives_hostile_registry_file() {
        let dir = TempDir::new().unwrap();
        let store = ShowStore::new(dir.path());
        store.create().unwrap();
        fs::write(dir.path().join(MEDIA_FILE), "0, \"NOT BLANK\" 99;\n").unwrap();

        let registry = store.load_media().unwrap();
        assert_eq!(registry[&0], Media::blank());
    }
}
