/// An axis-aligned latitude/longitude rectangle in degrees.
///
/// `BoundingBox` is the derived geometry of a way: the smallest rectangle
/// enclosing every member node that has coordinates. It is stored in the
/// way table as `[min_lat, min_lon, max_lat, max_lon]`.
///
/// # Examples
///
/// ```rust
/// use georef::BoundingBox;
///
/// let mut bbox = BoundingBox::from_point(1.0, 1.0);
/// bbox.expand(2.0, 2.0);
/// bbox.expand(-1.0, -1.0);
/// assert_eq!(bbox, BoundingBox::new(-1.0, -1.0, 2.0, 2.0));
/// ```
#[derive(Clone, Copy, PartialEq, Default, Debug)]
pub struct BoundingBox {
    /// Minimum latitude
    pub min_lat: f64,
    /// Minimum longitude
    pub min_lon: f64,
    /// Maximum latitude
    pub max_lat: f64,
    /// Maximum longitude
    pub max_lon: f64,
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingBox({}, {}, {}, {})",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(values: [f64; 4]) -> Self {
        BoundingBox::new(values[0], values[1], values[2], values[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> BoundingBox {
        BoundingBox {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// A degenerate box covering a single point.
    pub fn from_point(lat: f64, lon: f64) -> BoundingBox {
        BoundingBox::new(lat, lon, lat, lon)
    }

    /// Grows the box to include the point.
    pub fn expand(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lat = self.max_lat.max(lat);
        self.max_lon = self.max_lon.max(lon);
    }

    /// The storage order: `[min_lat, min_lon, max_lat, max_lon]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lat, self.min_lon, self.max_lat, self.max_lon]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tracks_running_max() {
        let mut bbox = BoundingBox::from_point(1.0, 1.0);
        bbox.expand(2.0, 2.0);
        bbox.expand(-1.0, -1.0);
        assert_eq!(bbox.to_array(), [-1.0, -1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_array_conversions() {
        let bbox = BoundingBox::from([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(bbox.min_lat, 1.0);
        assert_eq!(bbox.max_lon, 4.0);
        let values: [f64; 4] = bbox.into();
        assert_eq!(values, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BoundingBox::new(0.0, 0.0, 1.0, 1.5).to_string(),
            "BoundingBox(0, 0, 1, 1.5)"
        );
    }
}
