//! Allocation: validate, locate, rank, then pick a centre outside the
//! nearest city.
//!
//! # Decision flow
//!
//! ```text
//! validate ──► resolve origin ──► rank ──► select excluded ──► Allocated
//!    │               │              │             │
//! InvalidPincode PincodeNotFound NoNearestFound NoAlternativeAvailable
//! ```
//!
//! Randomness is injected through [`RandomSource`] so a decision is fully
//! determined by its arguments.

use crate::ranker::nearest_ranked;
use crate::{AllocationResult, Centre, CoordinateIndex, MAX_REJECTION_DRAWS, PINCODE_LEN};
use rand::rngs::ThreadRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

/// Source of uniform draws in `[0, 1)`
pub trait RandomSource {
    fn next_unit(&mut self) -> f64;
}

impl<F: FnMut() -> f64> RandomSource for F {
    fn next_unit(&mut self) -> f64 {
        self()
    }
}

/// Adapter from any `rand` generator
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl RngSource<ThreadRng> {
    pub fn thread() -> Self {
        Self(rand::thread_rng())
    }
}

impl RngSource<ChaCha8Rng> {
    /// Reproducible draws for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> RandomSource for RngSource<R> {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// How the alternative centre is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionStrategy {
    /// Collect centres outside the nearest city and draw once from them
    #[default]
    ExclusionSet,
    /// Draw from the full list until the city differs, at most `max_draws`
    /// times (never fewer than one)
    BoundedRejection { max_draws: usize },
}

impl SelectionStrategy {
    pub fn rejection() -> Self {
        SelectionStrategy::BoundedRejection {
            max_draws: MAX_REJECTION_DRAWS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AllocatorConfig {
    pub strategy: SelectionStrategy,
}

/// Exactly six ASCII digits; surrounding whitespace is not accepted
pub fn validate_pincode(input: &str) -> bool {
    input.len() == PINCODE_LEN && input.bytes().all(|b| b.is_ascii_digit())
}

/// Map a unit draw onto `0..len`
fn pick_index(unit: f64, len: usize) -> usize {
    if !unit.is_finite() {
        return 0;
    }
    let scaled = (unit.clamp(0.0, 1.0) * len as f64).floor() as usize;
    scaled.min(len - 1)
}

fn select_excluding<'a, R: RandomSource + ?Sized>(
    centres: &'a [Centre],
    nearest: &Centre,
    rng: &mut R,
) -> Option<&'a Centre> {
    let alternatives: Vec<&Centre> = centres.iter().filter(|c| c.city != nearest.city).collect();
    if alternatives.is_empty() {
        return None;
    }

    let pick = pick_index(rng.next_unit(), alternatives.len());
    debug!(
        "Picked alternative {} of {} outside {}",
        pick,
        alternatives.len(),
        nearest.city
    );
    Some(alternatives[pick])
}

fn select_by_rejection<'a, R: RandomSource + ?Sized>(
    centres: &'a [Centre],
    nearest: &Centre,
    rng: &mut R,
    max_draws: usize,
) -> Option<&'a Centre> {
    // A zero cap still draws once
    let max_draws = max_draws.max(1);
    for draw in 1..=max_draws {
        let candidate = &centres[pick_index(rng.next_unit(), centres.len())];
        if candidate.city != nearest.city {
            debug!("Accepted {} after {} draws", candidate.city, draw);
            return Some(candidate);
        }
    }

    warn!(
        "No centre outside {} after {} draws",
        nearest.city, max_draws
    );
    None
}

/// Allocate with the default configuration
pub fn allocate<R: RandomSource + ?Sized>(
    pincode: &str,
    centres: &[Centre],
    index: &CoordinateIndex,
    rng: &mut R,
) -> AllocationResult {
    allocate_with(&AllocatorConfig::default(), pincode, centres, index, rng)
}

/// Allocate a centre for `pincode`, never the nearest city when another exists
pub fn allocate_with<R: RandomSource + ?Sized>(
    config: &AllocatorConfig,
    pincode: &str,
    centres: &[Centre],
    index: &CoordinateIndex,
    rng: &mut R,
) -> AllocationResult {
    if !validate_pincode(pincode) {
        debug!("Rejected malformed pincode {:?}", pincode);
        return AllocationResult::InvalidPincode;
    }

    let Some(origin) = index.get(pincode) else {
        debug!("Pincode {} not in coordinate index", pincode);
        return AllocationResult::PincodeNotFound;
    };

    let Some(ranked) = nearest_ranked(origin, centres, index) else {
        return AllocationResult::NoNearestFound;
    };
    let nearest = ranked.centre;
    debug!(
        "Nearest centre to {} is {} ({:.1} km)",
        pincode, nearest.city, ranked.distance_km
    );

    if centres.len() <= 1 {
        return AllocationResult::Allocated {
            nearest: nearest.clone(),
            allocated: nearest.clone(),
        };
    }

    let selected = match config.strategy {
        SelectionStrategy::ExclusionSet => select_excluding(centres, nearest, rng),
        SelectionStrategy::BoundedRejection { max_draws } => {
            select_by_rejection(centres, nearest, rng, max_draws)
        }
    };

    match selected {
        Some(allocated) => AllocationResult::Allocated {
            nearest: nearest.clone(),
            allocated: allocated.clone(),
        },
        None => AllocationResult::NoAlternativeAvailable {
            nearest: nearest.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    fn two_city_fixture() -> (Vec<Centre>, CoordinateIndex) {
        let centres = vec![
            Centre::new("North", "A", "100000"),
            Centre::new("South", "B", "200000"),
        ];
        let mut index = CoordinateIndex::new();
        index.insert("100000", Coordinate::new(10.0, 10.0));
        index.insert("200000", Coordinate::new(-10.0, -10.0));
        // Origin sits much closer to A
        index.insert("000000", Coordinate::new(9.0, 9.0));
        (centres, index)
    }

    fn rejection(max_draws: usize) -> AllocatorConfig {
        AllocatorConfig {
            strategy: SelectionStrategy::BoundedRejection { max_draws },
        }
    }

    #[test]
    fn test_validate_pincode() {
        assert!(validate_pincode("110001"));
        assert!(validate_pincode("000000"));
        assert!(!validate_pincode("ABC123"));
        assert!(!validate_pincode("11000"));
        assert!(!validate_pincode("1100011"));
        assert!(!validate_pincode(" 110001"));
        assert!(!validate_pincode("11000١"));
        assert!(!validate_pincode(""));
    }

    #[test]
    fn test_invalid_pincode() {
        let (centres, index) = two_city_fixture();
        let result = allocate("ABC123", &centres, &index, &mut || 0.0);
        assert_eq!(result, AllocationResult::InvalidPincode);
    }

    #[test]
    fn test_pincode_not_found() {
        let (centres, _) = two_city_fixture();
        let result = allocate("999999", &centres, &CoordinateIndex::new(), &mut || 0.0);
        assert_eq!(result, AllocationResult::PincodeNotFound);
    }

    #[test]
    fn test_no_nearest_found() {
        let centres = vec![Centre::new("North", "A", "100000")];
        let mut index = CoordinateIndex::new();
        index.insert("000000", Coordinate::new(9.0, 9.0));

        let result = allocate("000000", &centres, &index, &mut || 0.0);
        assert_eq!(result, AllocationResult::NoNearestFound);

        let result = allocate("000000", &[], &index, &mut || 0.0);
        assert_eq!(result, AllocationResult::NoNearestFound);
    }

    #[test]
    fn test_allocates_other_city() {
        let (centres, index) = two_city_fixture();

        for config in [AllocatorConfig::default(), rejection(MAX_REJECTION_DRAWS)] {
            // 0.6 selects index 1 of the full two-centre list
            let result = allocate_with(&config, "000000", &centres, &index, &mut || 0.6);
            match result {
                AllocationResult::Allocated { nearest, allocated } => {
                    assert_eq!(nearest.city, "A");
                    assert_eq!(allocated.city, "B");
                }
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn test_rejection_redraws_until_city_differs() {
        let (centres, index) = two_city_fixture();
        let mut draws = vec![0.0, 0.1, 0.2, 0.9].into_iter();
        let mut calls = 0;
        let mut rng = || {
            calls += 1;
            draws.next().unwrap_or(0.0)
        };

        let result = allocate_with(&rejection(10), "000000", &centres, &index, &mut rng);
        assert_eq!(result.allocated().map(|c| c.city.as_str()), Some("B"));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_zero_draw_cap_still_draws_once() {
        let (centres, index) = two_city_fixture();
        let mut calls = 0;
        let mut rng = || {
            calls += 1;
            0.9
        };

        let result = allocate_with(&rejection(0), "000000", &centres, &index, &mut rng);
        assert_eq!(
            result,
            AllocationResult::Allocated {
                nearest: centres[0].clone(),
                allocated: centres[1].clone(),
            }
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_single_centre_falls_back_to_itself() {
        let centres = vec![Centre::new("North", "A", "100000")];
        let mut index = CoordinateIndex::new();
        index.insert("100000", Coordinate::new(10.0, 10.0));
        index.insert("000000", Coordinate::new(9.0, 9.0));

        let result = allocate("000000", &centres, &index, &mut || 0.5);
        match result {
            AllocationResult::Allocated { nearest, allocated } => {
                assert_eq!(nearest.city, allocated.city);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_all_same_city_terminates() {
        let centres = vec![
            Centre::new("North", "A", "100000"),
            Centre::new("North", "A", "100001"),
            Centre::new("North", "A", "100002"),
        ];
        let mut index = CoordinateIndex::new();
        index.insert("100000", Coordinate::new(10.0, 10.0));
        index.insert("000000", Coordinate::new(9.0, 9.0));

        let mut calls = 0;
        let mut rng = || {
            calls += 1;
            0.5
        };
        let result = allocate_with(&rejection(MAX_REJECTION_DRAWS), "000000", &centres, &index, &mut rng);
        assert_eq!(
            result,
            AllocationResult::NoAlternativeAvailable {
                nearest: centres[0].clone()
            }
        );
        assert_eq!(result.allocated(), Some(&centres[0]));
        assert_eq!(calls, MAX_REJECTION_DRAWS);

        let result = allocate("000000", &centres, &index, &mut || 0.5);
        assert!(matches!(result, AllocationResult::NoAlternativeAvailable { .. }));
    }

    #[test]
    fn test_exclusion_draws_once() {
        let mut centres = vec![Centre::new("North", "A", "100000")];
        for i in 0..9 {
            centres.push(Centre::new("North", "A", format!("10000{}", i + 1)));
        }
        centres.push(Centre::new("South", "B", "200000"));
        let mut index = CoordinateIndex::new();
        index.insert("100000", Coordinate::new(10.0, 10.0));
        index.insert("200000", Coordinate::new(-10.0, -10.0));
        index.insert("000000", Coordinate::new(9.0, 9.0));

        let mut calls = 0;
        let mut rng = || {
            calls += 1;
            0.0
        };
        let result = allocate("000000", &centres, &index, &mut rng);
        assert_eq!(result.allocated().map(|c| c.city.as_str()), Some("B"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_pick_index_bounds() {
        assert_eq!(pick_index(0.0, 4), 0);
        assert_eq!(pick_index(0.999_999, 4), 3);
        assert_eq!(pick_index(1.0, 4), 3);
        assert_eq!(pick_index(-0.5, 4), 0);
        assert_eq!(pick_index(f64::NAN, 4), 0);
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let mut a = RngSource::seeded(42);
        let mut b = RngSource::seeded(42);
        for _ in 0..16 {
            let x = a.next_unit();
            assert_eq!(x, b.next_unit());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_dyn_random_source() {
        let (centres, index) = two_city_fixture();
        let mut source = RngSource::seeded(7);
        let rng: &mut dyn RandomSource = &mut source;

        let result = allocate("000000", &centres, &index, rng);
        assert_eq!(result.allocated().map(|c| c.city.as_str()), Some("B"));
    }
}
