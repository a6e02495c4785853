//! Data loading: centre table (CSV) and pincode coordinates (JSON)

use crate::resolver::{resolve, RawCoordinateEntry};
use crate::{AllocatorError, Centre, CoordinateIndex, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::value::RawValue;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Column positions in the centre table
#[derive(Debug, Clone, Copy)]
struct CentreColumns {
    state: usize,
    city: usize,
    pincode: usize,
}

impl CentreColumns {
    /// Locate columns by header name, falling back to `state, city, pincode` order
    fn from_headers(headers: &StringRecord) -> Self {
        let find = |name: &str, fallback: usize| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .unwrap_or(fallback)
        };
        Self {
            state: find("state", 0),
            city: find("city", 1),
            pincode: find("pincode", 2),
        }
    }
}

fn field(record: &StringRecord, pos: usize) -> String {
    record.get(pos).map(str::trim).unwrap_or_default().to_string()
}

/// Parse the centre table; rows without a pincode are dropped
pub fn parse_centres<R: Read>(reader: R) -> Result<Vec<Centre>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let columns = CentreColumns::from_headers(reader.headers()?);

    let mut centres = Vec::new();
    let mut skipped = 0;

    for record in reader.records() {
        let record = record?;
        let pincode = field(&record, columns.pincode);
        if pincode.is_empty() {
            skipped += 1;
            continue;
        }

        centres.push(Centre {
            state: field(&record, columns.state),
            city: field(&record, columns.city),
            pincode,
        });
    }

    info!(
        "Loaded {} test centres ({} rows skipped without pincode)",
        centres.len(),
        skipped
    );

    Ok(centres)
}

/// Load the centre table from a CSV file
pub fn load_centres(path: impl AsRef<Path>) -> Result<Vec<Centre>> {
    let path = path.as_ref();
    info!("Loading test centres from {:?}", path);

    let file = File::open(path)?;
    parse_centres(BufReader::new(file))
}

/// JSON type of a validated document, judged by its first byte
fn json_kind(raw: &RawValue) -> &'static str {
    match raw.get().as_bytes().first() {
        Some(b'[') => "array",
        Some(b'{') => "object",
        Some(b'"') => "string",
        Some(b't' | b'f') => "boolean",
        Some(b'n') => "null",
        _ => "number",
    }
}

/// Parse coordinate records; records with the wrong shape are skipped.
///
/// The top-level array is split into raw records before any record is
/// decoded, so one pathological record (e.g. nested past serde_json's
/// recursion limit) is skipped on its own.
pub fn parse_coordinate_entries<R: Read>(mut reader: R) -> Result<Vec<RawCoordinateEntry>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    let document: &RawValue = serde_json::from_str(&text)?;
    if json_kind(document) != "array" {
        return Err(AllocatorError::NotAnArray(json_kind(document)));
    }
    let records: Vec<&RawValue> = serde_json::from_str(document.get())?;

    let mut entries = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for (i, record) in records.into_iter().enumerate() {
        match serde_json::from_str::<RawCoordinateEntry>(record.get()) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                skipped += 1;
                warn!("Skipping undecodable coordinate record {}: {}", i, e);
            }
        }
    }

    info!(
        "Read {} coordinate records ({} undecodable)",
        entries.len(),
        skipped
    );

    Ok(entries)
}

/// Load coordinate records from a JSON file
pub fn load_coordinate_entries(path: impl AsRef<Path>) -> Result<Vec<RawCoordinateEntry>> {
    let path = path.as_ref();
    info!("Loading pincode coordinates from {:?}", path);

    let file = File::open(path)?;
    parse_coordinate_entries(BufReader::new(file))
}

/// Load and resolve the coordinate dataset into an index
pub fn load_coordinate_index(path: impl AsRef<Path>) -> Result<CoordinateIndex> {
    let entries = load_coordinate_entries(path)?;
    Ok(resolve(entries))
}

/// Everything an allocation needs, loaded once up front
#[derive(Debug, Clone)]
pub struct Dataset {
    pub centres: Vec<Centre>,
    pub index: CoordinateIndex,
}

impl Dataset {
    pub fn new(centres: Vec<Centre>, index: CoordinateIndex) -> Result<Self> {
        if centres.is_empty() {
            return Err(AllocatorError::NoCentres);
        }
        Ok(Self { centres, index })
    }

    /// Load both datasets; fails if either is unreadable or no centre survives
    pub fn load(
        centres_path: impl AsRef<Path>,
        coordinates_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let centres = load_centres(centres_path)?;
        let index = load_coordinate_index(coordinates_path)?;

        let located = centres.iter().filter(|c| index.contains(&c.pincode)).count();
        if located < centres.len() {
            warn!(
                "{} of {} centres have no coordinates and will never be ranked",
                centres.len() - located,
                centres.len()
            );
        }

        Self::new(centres, index)
    }
}
