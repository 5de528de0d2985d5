/// Axis-aligned geographic bounding box in WGS84 degrees.
///
/// `west`/`east` are longitudes, `south`/`north` latitudes. A box whose
/// `west` is greater than its `east` crosses the antimeridian; this is left
/// to the backend to interpret and is not rejected here.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        GeoBounds {
            west,
            south,
            east,
            north,
        }
    }

    /// All four edges are finite and the latitude span is not inverted.
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.south <= self.north
            && (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north)
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }

    /// Parse `west,south,east,north`.
    pub fn parse_csv(raw: &str) -> Option<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        if parts.len() != 4 {
            return None;
        }
        let bounds = GeoBounds::new(parts[0], parts[1], parts[2], parts[3]);
        bounds.is_valid().then_some(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::GeoBounds;

    #[test]
    fn rejects_non_finite_and_inverted() {
        assert!(GeoBounds::new(-97.8, 30.2, -97.7, 30.3).is_valid());
        assert!(!GeoBounds::new(f64::NAN, 30.2, -97.7, 30.3).is_valid());
        assert!(!GeoBounds::new(-97.8, 30.3, -97.7, 30.2).is_valid());
        assert!(!GeoBounds::new(-97.8, -91.0, -97.7, 30.2).is_valid());
    }

    #[test]
    fn parses_csv_bbox() {
        let b = GeoBounds::parse_csv("-97.8, 30.2,-97.7,30.3").expect("parse");
        assert_eq!(b, GeoBounds::new(-97.8, 30.2, -97.7, 30.3));
        assert!(GeoBounds::parse_csv("1,2,3").is_none());
        assert!(GeoBounds::parse_csv("a,b,c,d").is_none());
    }
}
