use crate::srs::SpatialRef;

/// Axis-aligned bounding box in a declared spatial reference.
///
/// Coordinates are `(x, y)` in the reference's natural easting/northing
/// order, i.e. longitude/latitude for geographic references.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srs: SpatialRef,
}

impl BoundingBox {
    /// WGS84 box.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::with_srs(min_x, min_y, max_x, max_y, SpatialRef::WGS84)
    }

    pub fn with_srs(min_x: f64, min_y: f64, max_x: f64, max_y: f64, srs: SpatialRef) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            srs,
        }
    }

    /// Parses `"minx,miny,maxx,maxy"`.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [a, b, c, d] => Some(Self::new(*a, *b, *c, *d)),
            _ => None,
        }
    }

    /// Strictly ordered, finite extents. Degenerate boxes are rejected.
    pub fn is_valid(&self) -> bool {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        finite && self.min_x < self.max_x && self.min_y < self.max_y
    }

    /// Coordinates in `[min_x, min_y, max_x, max_y]` order.
    pub fn coords(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// Same box with the axes exchanged, for servers that read geographic
    /// coordinates as latitude/longitude.
    pub fn swapped_axes(&self) -> Self {
        Self {
            min_x: self.min_y,
            min_y: self.min_x,
            max_x: self.max_y,
            max_y: self.max_x,
            srs: self.srs,
        }
    }
}
