//! Test Centre Allocator
//!
//! Assigns a candidate to an examination centre from their 6-digit PIN code,
//! deliberately avoiding the city nearest to them.
//!
//! # Pipeline
//!
//! ```text
//! raw coordinate records ──► resolver::resolve ──► CoordinateIndex
//!                                                        │
//! pincode + centres + index ──► ranker::nearest ──► nearest Centre
//!                                                        │
//!                    allocator::allocate ──► AllocationResult
//! ```
//!
//! | Stage    | Module      | Failure handling |
//! |----------|-------------|------------------|
//! | Load     | `loader`    | `AllocatorError` (data unavailable) |
//! | Resolve  | `resolver`  | malformed records skipped and logged |
//! | Rank     | `ranker`    | unresolvable centres skipped |
//! | Allocate | `allocator` | named `AllocationResult` variants |
//!
//! The loaded centre list and coordinate index are immutable inputs; the
//! allocation itself is a pure function of its arguments and the injected
//! random source.

use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

pub mod allocator;
pub mod loader;
pub mod ranker;
pub mod resolver;

pub use allocator::{
    allocate, allocate_with, validate_pincode, AllocatorConfig, RandomSource, RngSource,
    SelectionStrategy,
};
pub use loader::Dataset;
pub use ranker::{haversine_km, nearest, RankedCentre};
pub use resolver::{resolve, NumericTree, RawCoordinateEntry};

/// Mean Earth radius in km
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Number of ASCII digits in an Indian PIN code
pub const PINCODE_LEN: usize = 6;

/// Deepest coordinate nesting the resolver will unwrap
pub const MAX_UNWRAP_DEPTH: usize = 32;

/// Retry cap for rejection-sampling selection
pub const MAX_REJECTION_DRAWS: usize = 10_000;

/// Data loading failures; the front end reports any of them as "data unavailable"
#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Coordinate dataset must be a JSON array, found {0}")]
    NotAnArray(&'static str),
    #[error("No test centres found")]
    NoCentres,
}

pub type Result<T> = std::result::Result<T, AllocatorError>;

/// An examination centre as listed in the centre table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Centre {
    pub state: String,
    pub city: String,
    /// Used only to look the centre up in the coordinate index; not unique
    pub pincode: String,
}

impl Centre {
    pub fn new(
        state: impl Into<String>,
        city: impl Into<String>,
        pincode: impl Into<String>,
    ) -> Self {
        Self {
            state: state.into(),
            city: city.into(),
            pincode: pincode.into(),
        }
    }
}

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Pincode → coordinate lookup, built once at load and read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct CoordinateIndex {
    entries: HashMap<String, Coordinate>,
}

impl CoordinateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a coordinate, returning the one it replaced
    pub fn insert(&mut self, pincode: impl Into<String>, coord: Coordinate) -> Option<Coordinate> {
        self.entries.insert(pincode.into(), coord)
    }

    pub fn get(&self, pincode: &str) -> Option<Coordinate> {
        self.entries.get(pincode).copied()
    }

    pub fn contains(&self, pincode: &str) -> bool {
        self.entries.contains_key(pincode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, Coordinate)> for CoordinateIndex {
    fn from_iter<I: IntoIterator<Item = (String, Coordinate)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Outcome of a single allocation request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AllocationResult {
    /// Input is not exactly six ASCII digits
    InvalidPincode,
    /// Input is well-formed but absent from the coordinate index
    PincodeNotFound,
    /// No centre has a resolvable coordinate
    NoNearestFound,
    /// Every centre shares the nearest city; allocation falls back to it
    NoAlternativeAvailable { nearest: Centre },
    Allocated { nearest: Centre, allocated: Centre },
}

impl AllocationResult {
    pub fn nearest(&self) -> Option<&Centre> {
        match self {
            Self::NoAlternativeAvailable { nearest } | Self::Allocated { nearest, .. } => {
                Some(nearest)
            }
            _ => None,
        }
    }

    /// The centre the candidate ends up with, including the fallback case
    pub fn allocated(&self) -> Option<&Centre> {
        match self {
            Self::NoAlternativeAvailable { nearest } => Some(nearest),
            Self::Allocated { allocated, .. } => Some(allocated),
            _ => None,
        }
    }
}
