//! Coordinate resolution from the raw pincode dataset
//!
//! Raw records carry `[lon, lat]` pairs that may be wrapped in any number of
//! single-element arrays (`[[[lon, lat]]]`). Resolution follows the first
//! element down until it reaches a list that is no longer nested, then
//! requires exactly two numbers there.

use crate::{Coordinate, CoordinateIndex, MAX_UNWRAP_DEPTH};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Arbitrarily nested numeric array as found in the coordinate dataset
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericTree {
    Number(f64),
    List(Vec<NumericTree>),
}

impl NumericTree {
    /// Build a flat `[lon, lat]` pair
    pub fn pair(lon: f64, lat: f64) -> Self {
        NumericTree::List(vec![NumericTree::Number(lon), NumericTree::Number(lat)])
    }

    /// Wrap this tree in one more single-element list
    pub fn wrap(self) -> Self {
        NumericTree::List(vec![self])
    }

    fn is_empty(&self) -> bool {
        matches!(self, NumericTree::List(items) if items.is_empty())
    }
}

/// One record of the coordinate dataset, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCoordinateEntry {
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub coordinates: Option<NumericTree>,
}

impl RawCoordinateEntry {
    pub fn new(pincode: impl Into<String>, coordinates: NumericTree) -> Self {
        Self {
            pincode: Some(pincode.into()),
            coordinates: Some(coordinates),
        }
    }
}

/// Why a raw record was left out of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPincode,
    MissingCoordinates,
    DepthExceeded,
    NotAPair,
}

impl SkipReason {
    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::MissingPincode => "missing or empty pincode",
            SkipReason::MissingCoordinates => "missing or empty coordinates",
            SkipReason::DepthExceeded => "coordinate nesting too deep",
            SkipReason::NotAPair => "innermost value is not a [lon, lat] pair",
        }
    }
}

/// Unwrap nested single-element lists down to a `(lon, lat)` pair.
///
/// Only the first element is followed at each level; siblings are ignored.
pub fn unwrap_pair(tree: &NumericTree, max_depth: usize) -> Result<(f64, f64), SkipReason> {
    let mut current = tree;
    let mut depth = 0;

    while let NumericTree::List(items) = current {
        match items.first() {
            Some(inner @ NumericTree::List(_)) => {
                if depth >= max_depth {
                    return Err(SkipReason::DepthExceeded);
                }
                current = inner;
                depth += 1;
            }
            _ => break,
        }
    }

    match current {
        NumericTree::List(items) => match items.as_slice() {
            [NumericTree::Number(lon), NumericTree::Number(lat)]
                if lon.is_finite() && lat.is_finite() =>
            {
                Ok((*lon, *lat))
            }
            _ => Err(SkipReason::NotAPair),
        },
        NumericTree::Number(_) => Err(SkipReason::NotAPair),
    }
}

/// Validate a single record and convert it to an index entry
pub fn resolve_entry(
    entry: &RawCoordinateEntry,
    max_depth: usize,
) -> Result<(String, Coordinate), SkipReason> {
    let pincode = match entry.pincode.as_deref() {
        Some(p) if !p.is_empty() => p,
        _ => return Err(SkipReason::MissingPincode),
    };

    let coordinates = match &entry.coordinates {
        Some(c) if !c.is_empty() => c,
        _ => return Err(SkipReason::MissingCoordinates),
    };

    let (lon, lat) = unwrap_pair(coordinates, max_depth)?;
    Ok((pincode.to_string(), Coordinate::new(lat, lon)))
}

/// Build the coordinate index, skipping records that cannot be resolved
pub fn resolve<I>(entries: I) -> CoordinateIndex
where
    I: IntoIterator<Item = RawCoordinateEntry>,
{
    resolve_with_depth(entries, MAX_UNWRAP_DEPTH)
}

/// [`resolve`] with an explicit nesting cap
pub fn resolve_with_depth<I>(entries: I, max_depth: usize) -> CoordinateIndex
where
    I: IntoIterator<Item = RawCoordinateEntry>,
{
    let mut index = CoordinateIndex::new();
    let mut skipped = 0;
    let mut overwritten = 0;

    for (i, entry) in entries.into_iter().enumerate() {
        match resolve_entry(&entry, max_depth) {
            Ok((pincode, coord)) => {
                if let Some(previous) = index.insert(pincode.clone(), coord) {
                    overwritten += 1;
                    debug!(
                        "Pincode {} repeated at record {}; replacing {:?} with {:?}",
                        pincode, i, previous, coord
                    );
                }
            }
            Err(reason) => {
                skipped += 1;
                warn!(
                    "Skipping coordinate record {} ({:?}): {}",
                    i,
                    entry.pincode.as_deref().unwrap_or(""),
                    reason.description()
                );
            }
        }
    }

    info!(
        "Resolved {} pincodes ({} skipped, {} overwritten)",
        index.len(),
        skipped,
        overwritten
    );

    index
}
