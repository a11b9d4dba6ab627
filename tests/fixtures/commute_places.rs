//! Las Vegas / Henderson places used as commute endpoints.
//!
//! Coordinates sourced from OpenStreetMap.

use commute_advisor::types::Coordinate;

/// A named place with coordinates.
#[derive(Debug, Clone)]
pub struct Place {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

// ============================================================================
// Homes (origins)
// ============================================================================

pub const HOMES: &[Place] = &[
    Place::new("Green Valley Ranch Area", 36.0308, -115.0825),
    Place::new("Sunset Station Area", 36.0614, -115.0631),
    Place::new("Budget Suites South", 36.0366259, -115.1713361),
];

// ============================================================================
// Workplaces (destinations)
// ============================================================================

pub const WORKPLACES: &[Place] = &[
    Place::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Place::new("Bellagio", 36.1126, -115.1767),
    Place::new("MGM Grand", 36.1023654, -115.1688720),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_in_vegas_area() {
        for place in HOMES.iter().chain(WORKPLACES) {
            assert!(place.lat > 35.9 && place.lat < 36.3, "{} lat out of range: {}", place.name, place.lat);
            assert!(place.lng > -115.4 && place.lng < -114.8, "{} lng out of range: {}", place.name, place.lng);
        }
    }
}
