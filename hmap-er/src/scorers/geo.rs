//! Geographic similarity
//!
//! Great-circle distance mapped linearly onto [0, 1]: 1.0 at 0 m, 0.0 at or
//! beyond the configured radius.

use super::DimensionScorer;
use crate::error::MatchError;
use crate::normalizer::{CoordinateField, Coordinates, NormalizedRecord};
use crate::types::{Dimension, DimensionScore};
use std::cmp::Ordering;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in metres
///
/// The two points are put in a canonical order first, so the result is
/// bit-identical whichever way round they are passed.
pub fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let (p1, p2) = match a
        .latitude
        .partial_cmp(&b.latitude)
        .unwrap_or(Ordering::Equal)
        .then(a.longitude.partial_cmp(&b.longitude).unwrap_or(Ordering::Equal))
    {
        Ordering::Greater => (b, a),
        _ => (a, b),
    };

    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Distance-decay scorer
#[derive(Debug, Clone, Copy)]
pub struct GeoScorer {
    radius_m: f64,
}

impl GeoScorer {
    /// `radius_m` must be positive (checked at configuration time)
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    fn coordinates(record: &NormalizedRecord) -> Result<Option<Coordinates>, MatchError> {
        match &record.coordinates {
            CoordinateField::Valid(c) => Ok(Some(*c)),
            CoordinateField::Missing => Ok(None),
            CoordinateField::Malformed(reason) => Err(MatchError::ScorerUnavailable {
                dimension: Dimension::Geo,
                reason: reason.clone(),
            }),
        }
    }
}

impl DimensionScorer for GeoScorer {
    fn dimension(&self) -> Dimension {
        Dimension::Geo
    }

    fn score(&self, a: &NormalizedRecord, b: &NormalizedRecord) -> Result<DimensionScore, MatchError> {
        let (a, b) = match (Self::coordinates(a)?, Self::coordinates(b)?) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(DimensionScore::unknown(Dimension::Geo)),
        };

        let distance_m = haversine_m(a, b);
        let similarity = 1.0 - distance_m / self.radius_m;

        Ok(DimensionScore::known(Dimension::Geo, similarity).with_distance(distance_m))
    }
}
