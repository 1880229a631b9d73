/// Spatial reference identified by its EPSG code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpatialRef(pub u32);

impl SpatialRef {
    pub const WGS84: SpatialRef = SpatialRef(4326);
    pub const WEB_MERCATOR: SpatialRef = SpatialRef(3857);

    /// Geographic (degree-based) references have an ambiguous axis order on
    /// the wire; projected ones do not.
    pub fn is_geographic(&self) -> bool {
        matches!(self.0, 4326 | 4258 | 4269 | 4979)
    }

    /// `EPSG:<code>` form used in `srsName` and CQL literals.
    pub fn urn(&self) -> String {
        format!("EPSG:{}", self.0)
    }

    /// Accepts `EPSG:4326`, `epsg:4326` or a bare `4326`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let code = match s.split_once(':') {
            Some((auth, code)) if auth.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return None,
            None => s,
        };
        code.trim().parse::<u32>().ok().map(SpatialRef)
    }
}

impl Default for SpatialRef {
    fn default() -> Self {
        Self::WGS84
    }
}

impl std::fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}
