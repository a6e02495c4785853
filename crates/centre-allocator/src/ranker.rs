//! Great-circle distance and nearest-centre ranking

use crate::{Centre, Coordinate, CoordinateIndex, EARTH_RADIUS_KM};
use std::f64::consts::PI;
use tracing::debug;

/// A centre together with its distance from the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedCentre<'a> {
    pub centre: &'a Centre,
    pub distance_km: f64,
}

/// Haversine distance between two points in km
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1_rad = a.lat * PI / 180.0;
    let lat2_rad = b.lat * PI / 180.0;
    let dlat = (b.lat - a.lat) * PI / 180.0;
    let dlon = (b.lon - a.lon) * PI / 180.0;

    let h = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distances to every centre whose pincode resolves, in input order
fn resolvable<'a>(
    origin: Coordinate,
    centres: &'a [Centre],
    index: &'a CoordinateIndex,
) -> impl Iterator<Item = RankedCentre<'a>> + 'a {
    centres.iter().filter_map(move |centre| match index.get(&centre.pincode) {
        Some(coord) => Some(RankedCentre {
            centre,
            distance_km: haversine_km(origin, coord),
        }),
        None => {
            debug!(
                "Centre {} has no coordinates for pincode {}",
                centre.city, centre.pincode
            );
            None
        }
    })
}

/// Nearest centre and its distance.
///
/// Only a strictly smaller distance displaces the current best, so the first
/// of several equidistant centres wins.
pub fn nearest_ranked<'a>(
    origin: Coordinate,
    centres: &'a [Centre],
    index: &'a CoordinateIndex,
) -> Option<RankedCentre<'a>> {
    let mut best: Option<RankedCentre<'a>> = None;

    for ranked in resolvable(origin, centres, index) {
        match best {
            Some(current) if ranked.distance_km >= current.distance_km => {}
            _ => best = Some(ranked),
        }
    }

    best
}

/// Nearest centre to `origin`, or `None` if no centre can be located
pub fn nearest<'a>(
    origin: Coordinate,
    centres: &'a [Centre],
    index: &'a CoordinateIndex,
) -> Option<&'a Centre> {
    nearest_ranked(origin, centres, index).map(|r| r.centre)
}

/// All locatable centres by ascending distance; ties keep input order
pub fn rank_all<'a>(
    origin: Coordinate,
    centres: &'a [Centre],
    index: &'a CoordinateIndex,
) -> Vec<RankedCentre<'a>> {
    let mut ranked: Vec<RankedCentre<'a>> = resolvable(origin, centres, index).collect();
    ranked.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
