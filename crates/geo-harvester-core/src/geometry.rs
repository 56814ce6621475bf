//! Shape checks for `dcat_bbox` and `locn_geometry` strings.
//!
//! Accepts `ENVELOPE(minX, maxX, maxY, minY)` and the common WKT geometry
//! types. Nothing here is spatial analysis: the checks only confirm the
//! string is well-formed and its coordinates are in range.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("unrecognized geometry '{0}'")]
    Unrecognized(String),
    #[error("coordinate '{0}' is not a number")]
    NotANumber(String),
    #[error("envelope needs 4 coordinates, found {0}")]
    EnvelopeArity(usize),
    #[error("longitude {0} out of range")]
    Longitude(f64),
    #[error("latitude {0} out of range")]
    Latitude(f64),
    #[error("envelope minimum latitude {min} exceeds maximum {max}")]
    InvertedLatitude { min: f64, max: f64 },
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl Envelope {
    /// `ENVELOPE(W,E,N,S)`
    pub fn to_wkt(&self) -> String {
        format!(
            "ENVELOPE({}, {}, {}, {})",
            self.west, self.east, self.north, self.south
        )
    }

    pub fn area(&self) -> f64 {
        ((self.east - self.west) * (self.north - self.south)).abs()
    }

    pub fn is_point(&self) -> bool {
        self.west == self.east && self.north == self.south
    }
}

fn wkt_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(POINT|LINESTRING|POLYGON|MULTIPOINT|MULTILINESTRING|MULTIPOLYGON)\s*\(([-0-9.eE,\s()]+)\)\s*$",
        )
        .expect("wkt regex")
    })
}

fn envelope_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*ENVELOPE\s*\(([^()]*)\)\s*$").expect("envelope regex")
    })
}

/// Parse an `ENVELOPE(W,E,N,S)` string.
pub fn parse_envelope(s: &str) -> Result<Envelope, GeometryError> {
    let caps = envelope_pattern()
        .captures(s)
        .ok_or_else(|| GeometryError::Unrecognized(s.to_string()))?;
    let coords = caps[1]
        .split(',')
        .map(|c| {
            let c = c.trim();
            c.parse::<f64>()
                .map_err(|_| GeometryError::NotANumber(c.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if coords.len() != 4 {
        return Err(GeometryError::EnvelopeArity(coords.len()));
    }
    let env = Envelope {
        west: coords[0],
        east: coords[1],
        north: coords[2],
        south: coords[3],
    };
    for lon in [env.west, env.east] {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeometryError::Longitude(lon));
        }
    }
    for lat in [env.north, env.south] {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeometryError::Latitude(lat));
        }
    }
    if env.south > env.north {
        return Err(GeometryError::InvertedLatitude {
            min: env.south,
            max: env.north,
        });
    }
    Ok(env)
}

/// Confirm a geometry string is an envelope or well-formed WKT.
pub fn check(s: &str) -> Result<(), GeometryError> {
    if envelope_pattern().is_match(s) {
        return parse_envelope(s).map(|_| ());
    }
    let caps = wkt_pattern()
        .captures(s)
        .ok_or_else(|| GeometryError::Unrecognized(s.to_string()))?;

    let body = &caps[2];
    let flat = body.replace(['(', ')'], " ");
    for pair in flat.split(',') {
        let nums: Vec<&str> = pair.split_whitespace().collect();
        if nums.len() != 2 {
            return Err(GeometryError::Unrecognized(s.to_string()));
        }
        let lon: f64 = nums[0]
            .parse()
            .map_err(|_| GeometryError::NotANumber(nums[0].to_string()))?;
        let lat: f64 = nums[1]
            .parse()
            .map_err(|_| GeometryError::NotANumber(nums[1].to_string()))?;
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeometryError::Longitude(lon));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeometryError::Latitude(lat));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_wkt() {
        let env = parse_envelope("ENVELOPE(-71.1, -70.9, 42.4, 42.2)").unwrap();
        assert_eq!(env.west, -71.1);
        assert_eq!(env.south, 42.2);
        assert_eq!(env.to_wkt(), "ENVELOPE(-71.1, -70.9, 42.4, 42.2)");
    }

    #[test]
    fn bad_envelopes() {
        assert_eq!(
            parse_envelope("ENVELOPE(1, 2, 3)"),
            Err(GeometryError::EnvelopeArity(3))
        );
        assert_eq!(
            parse_envelope("ENVELOPE(-200, 2, 3, 1)"),
            Err(GeometryError::Longitude(-200.0))
        );
        assert!(matches!(
            parse_envelope("ENVELOPE(0, 1, 10, 20)"),
            Err(GeometryError::InvertedLatitude { .. })
        ));
    }

    #[test]
    fn wkt_shapes() {
        assert!(check("POINT(-71.09 42.36)").is_ok());
        assert!(check("POLYGON((0 0, 1 0, 1 1, 0 0))").is_ok());
        assert!(check("MULTIPOINT((1 2), (3 4))").is_ok());
        assert!(check("POINT(-71.09)").is_err());
        assert!(check("CIRCLE(1 2, 3)").is_err());
        assert!(check("").is_err());
    }
}
