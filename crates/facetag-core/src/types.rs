use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Pixel-space bounding box for a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Detector output in frame-relative units (`[0, 1]` on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeBox {
    pub xmin: f32,
    pub ymin: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Convert a relative detection into pixels, truncating toward zero.
    pub fn from_relative(rel: &RelativeBox, frame_width: u32, frame_height: u32) -> Self {
        let w = frame_width as f32;
        let h = frame_height as f32;
        Self {
            x: (rel.xmin * w) as i32,
            y: (rel.ymin * h) as i32,
            width: (rel.width * w) as i32,
            height: (rel.height * h) as i32,
        }
    }

    /// Exclusive right edge, widened so saturated relative boxes cannot overflow.
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Whether the box lies strictly inside a `frame_width`×`frame_height` frame
    /// and has a positive area. Boxes touching the right or bottom edge are rejected.
    pub fn fits(&self, frame_width: u32, frame_height: u32) -> bool {
        let (w, h) = (frame_width as i64, frame_height as i64);
        let (x1, y1) = (self.x as i64, self.y as i64);
        let (x2, y2) = (self.right(), self.bottom());
        !(x1 < 0 || y1 < 0 || x2 >= w || y2 >= h || x2 <= x1 || y2 <= y1)
    }
}

/// Coarse, quantized bounding box used to add spatial stability to memory keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionBucket {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PositionBucket {
    /// Quantize `bbox` into bins of `bin_size` pixels. A zero bin size is treated as 1.
    pub fn from_box(bbox: &BoundingBox, bin_size: u32) -> Self {
        let bin = bin_size.max(1) as i32;
        Self {
            x: bbox.x.div_euclid(bin),
            y: bbox.y.div_euclid(bin),
            width: bbox.width.div_euclid(bin),
            height: bbox.height.div_euclid(bin),
        }
    }
}

impl std::fmt::Display for PositionBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}_{}", self.x, self.y, self.width, self.height)
    }
}

/// A rectangular pixel region cut out of a frame.
///
/// Owned by the request that produced it and dropped once its identity is
/// resolved. `data` is row-major, interleaved, `channels` bytes per pixel.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl FaceCrop {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Cut `bbox` out of an RGB frame. The box is clamped to the frame, so a
    /// box that falls entirely outside yields an empty crop.
    pub fn from_frame(frame: &RgbImage, bbox: &BoundingBox) -> Self {
        let x = bbox.x.clamp(0, frame.width() as i32) as u32;
        let y = bbox.y.clamp(0, frame.height() as i32) as u32;
        let right = bbox.right().clamp(0, frame.width() as i64) as u32;
        let bottom = bbox.bottom().clamp(0, frame.height() as i64) as u32;
        let width = right.saturating_sub(x);
        let height = bottom.saturating_sub(y);

        let region = image::imageops::crop_imm(frame, x, y, width, height).to_image();
        Self::new(region.into_raw(), width, height, 3)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of bytes the pixel buffer should hold for the declared geometry.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Whether the buffer agrees with the declared geometry and a supported
    /// channel layout (gray, RGB or RGBA).
    pub fn is_well_formed(&self) -> bool {
        matches!(self.channels, 1 | 3 | 4) && self.data.len() == self.expected_len()
    }
}

/// Face descriptor vector produced by an embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two descriptors.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Outcome of resolving a single face.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Named(String),
    /// Recognized as not matching any known identity, or nothing is known.
    Unknown,
    /// The pipeline failed for this face.
    Error,
}

/// Labels reported for the reserved identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentinels {
    pub unknown: String,
    pub error: String,
    pub no_face: String,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            unknown: "unknown".into(),
            error: "error".into(),
            no_face: "no_face".into(),
        }
    }
}

impl Sentinels {
    pub fn label(&self, identity: &Identity) -> String {
        match identity {
            Identity::Named(name) => name.clone(),
            Identity::Unknown => self.unknown.clone(),
            Identity::Error => self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Descriptor::new(vec![0.3, 0.4, 0.5]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_3_4_5() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_relative_truncates() {
        let rel = RelativeBox { xmin: 0.25, ymin: 0.1, width: 0.333, height: 0.5 };
        let bbox = BoundingBox::from_relative(&rel, 160, 120);
        assert_eq!(bbox, BoundingBox::new(40, 12, 53, 60));
    }

    #[test]
    fn test_fits_rejects_out_of_frame() {
        assert!(BoundingBox::new(10, 10, 20, 20).fits(160, 120));
        assert!(!BoundingBox::new(-1, 10, 20, 20).fits(160, 120));
        assert!(!BoundingBox::new(10, -5, 20, 20).fits(160, 120));
        // Right edge exactly at the frame width is rejected.
        assert!(!BoundingBox::new(140, 10, 20, 20).fits(160, 120));
        assert!(!BoundingBox::new(10, 100, 20, 20).fits(160, 120));
    }

    #[test]
    fn test_fits_rejects_non_positive_size() {
        assert!(!BoundingBox::new(10, 10, 0, 20).fits(160, 120));
        assert!(!BoundingBox::new(10, 10, 20, -3).fits(160, 120));
    }

    #[test]
    fn test_fits_rejects_saturated_box() {
        let rel = RelativeBox { xmin: 1e7, ymin: 0.1, width: 1e7, height: 0.3 };
        let bbox = BoundingBox::from_relative(&rel, 160, 120);
        assert_eq!(bbox.right(), 3_200_000_000);
        assert!(!bbox.fits(160, 120));
        assert!(!BoundingBox::new(i32::MAX, i32::MAX, i32::MAX, i32::MAX).fits(160, 120));

        let frame = RgbImage::new(160, 120);
        assert!(FaceCrop::from_frame(&frame, &bbox).is_empty());
    }

    #[test]
    fn test_position_bucket_quantizes() {
        let a = PositionBucket::from_box(&BoundingBox::new(41, 59, 62, 79), 20);
        let b = PositionBucket::from_box(&BoundingBox::new(45, 50, 60, 70), 20);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "2_2_3_3");
    }

    #[test]
    fn test_position_bucket_zero_bin() {
        let bucket = PositionBucket::from_box(&BoundingBox::new(7, 8, 9, 10), 0);
        assert_eq!(bucket, PositionBucket { x: 7, y: 8, width: 9, height: 10 });
    }

    #[test]
    fn test_crop_from_frame() {
        let frame = RgbImage::from_fn(8, 6, |x, y| image::Rgb([x as u8, y as u8, 0]));
        let crop = FaceCrop::from_frame(&frame, &BoundingBox::new(2, 1, 3, 2));
        assert_eq!((crop.width, crop.height, crop.channels), (3, 2, 3));
        assert!(crop.is_well_formed());
        // First pixel of the crop is frame pixel (2, 1).
        assert_eq!(&crop.data[..3], &[2, 1, 0]);
    }

    #[test]
    fn test_crop_outside_frame_is_empty() {
        let frame = RgbImage::new(8, 6);
        let crop = FaceCrop::from_frame(&frame, &BoundingBox::new(20, 20, 5, 5));
        assert!(crop.is_empty());
    }

    #[test]
    fn test_crop_well_formed() {
        assert!(FaceCrop::new(vec![0; 12], 2, 2, 3).is_well_formed());
        assert!(!FaceCrop::new(vec![0; 11], 2, 2, 3).is_well_formed());
        assert!(!FaceCrop::new(vec![0; 8], 2, 2, 2).is_well_formed());
    }

    #[test]
    fn test_sentinel_labels() {
        let s = Sentinels::default();
        assert_eq!(s.label(&Identity::Named("ana".into())), "ana");
        assert_eq!(s.label(&Identity::Unknown), "unknown");
        assert_eq!(s.label(&Identity::Error), "error");
        assert_ne!(s.unknown, s.error);
    }
}
