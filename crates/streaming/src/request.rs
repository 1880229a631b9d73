use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use scene::Feature;

/// Virtual camera pointed into a 360° capture. Angles in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraParams {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub fov: f64,
}

impl Default for CameraParams {
    /// Level-ish forward view tilted toward the road surface.
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: -30.0,
            roll: 0.0,
            fov: 90.0,
        }
    }
}

impl CameraParams {
    /// Bit patterns used for identity. `-0.0` folds into `0.0` so the two
    /// render the same key, matching `PartialEq`.
    fn identity_bits(&self) -> [u64; 4] {
        fn bits(v: f64) -> u64 {
            if v == 0.0 { 0 } else { v.to_bits() }
        }
        [
            bits(self.yaw),
            bits(self.pitch),
            bits(self.roll),
            bits(self.fov),
        ]
    }
}

/// Everything that changes the rendered bytes of a capture.
///
/// Two keys are equal only when every field is equal; dropping any field
/// from the identity would serve a stale render for a different view.
/// Ordering is deterministic but carries no numeric meaning.
#[derive(Debug, Clone)]
pub struct ImageryKey {
    pub recording_id: String,
    pub item_id: String,
    pub scale: Option<String>,
    pub section: Option<String>,
    pub camera: CameraParams,
}

impl ImageryKey {
    pub fn new(recording_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            recording_id: recording_id.into(),
            item_id: item_id.into(),
            scale: None,
            section: None,
            camera: CameraParams::default(),
        }
    }

    pub fn with_scale(mut self, scale: impl Into<String>) -> Self {
        self.scale = Some(scale.into());
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_camera(mut self, camera: CameraParams) -> Self {
        self.camera = camera;
        self
    }

    /// Key for `feature` viewed through `camera`. `None` when the feature
    /// carries no recording or item id.
    pub fn for_feature(feature: &Feature, camera: CameraParams) -> Option<Self> {
        Some(Self {
            recording_id: feature.recording_id()?,
            item_id: feature.item_id()?,
            scale: feature.scale(),
            section: feature.section(),
            camera,
        })
    }

    fn identity(&self) -> (&str, &str, Option<&str>, Option<&str>, [u64; 4]) {
        (
            &self.recording_id,
            &self.item_id,
            self.scale.as_deref(),
            self.section.as_deref(),
            self.camera.identity_bits(),
        )
    }
}

impl PartialEq for ImageryKey {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for ImageryKey {}

impl Hash for ImageryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for ImageryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImageryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

/// A single imagery fetch: the cache key plus output-only parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageryRequest {
    pub key: ImageryKey,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: Option<String>,
}

impl ImageryRequest {
    pub fn new(key: ImageryKey) -> Self {
        Self {
            key,
            width: None,
            height: None,
            mode: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Query string pairs in wire order; unset parameters are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let k = &self.key;
        let mut out: Vec<(&'static str, String)> = Vec::with_capacity(9);
        if let Some(scale) = &k.scale {
            out.push(("scale", scale.clone()));
        }
        if let Some(section) = &k.section {
            out.push(("section", section.clone()));
        }
        out.push(("yaw", k.camera.yaw.to_string()));
        out.push(("pitch", k.camera.pitch.to_string()));
        out.push(("roll", k.camera.roll.to_string()));
        out.push(("fov", k.camera.fov.to_string()));
        if let Some(w) = self.width {
            out.push(("width", w.to_string()));
        }
        if let Some(h) = self.height {
            out.push(("height", h.to_string()));
        }
        if let Some(mode) = &self.mode {
            out.push(("mode", mode.clone()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraParams, ImageryKey, ImageryRequest};
    use std::collections::HashSet;

    fn base() -> ImageryKey {
        ImageryKey::new("rec-1", "item-1")
            .with_scale("2")
            .with_section("0")
            .with_camera(CameraParams {
                yaw: 10.0,
                pitch: -30.0,
                roll: 0.0,
                fov: 90.0,
            })
    }

    #[test]
    fn same_tuple_gives_same_key() {
        assert_eq!(base(), base());
        let mut set = HashSet::new();
        set.insert(base());
        assert!(set.contains(&base()));
    }

    #[test]
    fn any_single_differing_field_gives_a_distinct_key() {
        let variants: Vec<ImageryKey> = vec![
            ImageryKey { recording_id: "rec-2".into(), ..base() },
            ImageryKey { item_id: "item-2".into(), ..base() },
            ImageryKey { scale: Some("3".into()), ..base() },
            ImageryKey { scale: None, ..base() },
            ImageryKey { section: Some("1".into()), ..base() },
            base().with_camera(CameraParams { yaw: 11.0, ..base().camera }),
            base().with_camera(CameraParams { pitch: -29.0, ..base().camera }),
            base().with_camera(CameraParams { roll: 1.0, ..base().camera }),
            base().with_camera(CameraParams { fov: 60.0, ..base().camera }),
        ];

        let mut set: HashSet<ImageryKey> = HashSet::new();
        set.insert(base());
        for v in &variants {
            assert_ne!(v, &base());
            assert!(set.insert(v.clone()), "collision for {v:?}");
        }
    }

    #[test]
    fn negative_zero_matches_zero() {
        let a = base().with_camera(CameraParams { roll: 0.0, ..base().camera });
        let b = base().with_camera(CameraParams { roll: -0.0, ..base().camera });
        assert_eq!(a, b);
    }

    #[test]
    fn unset_parameters_are_omitted() {
        let req = ImageryRequest::new(ImageryKey::new("r", "i"));
        let names: Vec<&str> = req.query_pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(names, vec!["yaw", "pitch", "roll", "fov"]);

        let req = ImageryRequest::new(base()).with_size(600, 400).with_mode("spherical");
        let names: Vec<&str> = req.query_pairs().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec!["scale", "section", "yaw", "pitch", "roll", "fov", "width", "height", "mode"]
        );
    }
}
