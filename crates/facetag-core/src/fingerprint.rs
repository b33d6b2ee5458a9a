//! Face fingerprinting.
//!
//! Reduces a face crop to a small canonical grayscale patch, equalizes its
//! histogram and hashes the result. Scale and exposure differences wash out
//! in the normalization; pose differences do not.

use crate::types::FaceCrop;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Side length of the canonical patch the crop is resized to.
pub const DEFAULT_CANONICAL_SIZE: u32 = 32;

/// Hex digits consumed by [`Fingerprint::index`].
const INDEX_HEX_DIGITS: usize = 8;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("empty crop ({width}x{height})")]
    EmptyCrop { width: u32, height: u32 },
    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),
    #[error("crop buffer holds {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },
}

/// Deterministic hash of a normalized face crop, as 64 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A fingerprint that cannot collide with any earlier one: wall-clock
    /// nanoseconds plus a process-wide counter, hashed.
    pub fn from_clock() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(seq.to_le_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Deterministically map the fingerprint onto `0..n`.
    ///
    /// The leading hex digits are read as an unsigned integer and reduced
    /// modulo `n`. Returns `None` when `n == 0`.
    pub fn index(&self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        let prefix = self.0.get(..INDEX_HEX_DIGITS)?;
        let value = u32::from_str_radix(prefix, 16).ok()?;
        Some(value as usize % n)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns face crops into [`Fingerprint`]s.
#[derive(Debug, Clone)]
pub struct FingerprintGenerator {
    canonical_size: u32,
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CANONICAL_SIZE)
    }
}

impl FingerprintGenerator {
    pub fn new(canonical_size: u32) -> Self {
        Self {
            canonical_size: canonical_size.max(1),
        }
    }

    /// Fingerprint a crop, falling back to a clock-derived value on failure.
    ///
    /// The fallback is unique per call, so a face that cannot be normalized
    /// is always treated as a new identity. `IdentityResolver` never reaches
    /// it: crops that would fail here are labelled `error` before hashing.
    pub fn fingerprint(&self, crop: &FaceCrop) -> Fingerprint {
        match self.try_fingerprint(crop) {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(error = %e, "fingerprint failed; using clock fallback");
                Fingerprint::from_clock()
            }
        }
    }

    pub fn try_fingerprint(&self, crop: &FaceCrop) -> Result<Fingerprint, FingerprintError> {
        let normalized = self.normalize(crop)?;
        Ok(Fingerprint(format!("{:x}", Sha256::digest(normalized.as_raw()))))
    }

    /// Resize to the canonical patch, convert to intensity, equalize.
    pub fn normalize(&self, crop: &FaceCrop) -> Result<GrayImage, FingerprintError> {
        let image = to_dynamic(crop)?;
        let size = self.canonical_size;
        let mut gray = image.resize_exact(size, size, FilterType::Triangle).to_luma8();
        equalize_histogram(&mut gray);
        Ok(gray)
    }
}

fn to_dynamic(crop: &FaceCrop) -> Result<DynamicImage, FingerprintError> {
    if crop.is_empty() {
        return Err(FingerprintError::EmptyCrop {
            width: crop.width,
            height: crop.height,
        });
    }
    let mismatch = || FingerprintError::BufferMismatch {
        expected: crop.expected_len(),
        actual: crop.data.len(),
    };
    let (w, h) = (crop.width, crop.height);
    let data = crop.data.clone();

    match crop.channels {
        1 => ImageBuffer::from_raw(w, h, data)
            .map(|img: GrayImage| DynamicImage::ImageLuma8(img))
            .ok_or_else(mismatch),
        3 => ImageBuffer::from_raw(w, h, data)
            .map(|img: RgbImage| DynamicImage::ImageRgb8(img))
            .ok_or_else(mismatch),
        4 => ImageBuffer::from_raw(w, h, data)
            .map(|img: RgbaImage| DynamicImage::ImageRgba8(img))
            .ok_or_else(mismatch),
        other => Err(FingerprintError::UnsupportedChannels(other)),
    }
}

/// Global histogram equalization in-place.
///
/// Builds the cumulative histogram and remaps every level through
/// `(cdf[v] - cdf_min) * 255 / (N - cdf_min)`. A single-level image is left
/// untouched.
pub fn equalize_histogram(gray: &mut GrayImage) {
    let pixels = gray.as_mut();
    let total = pixels.len() as u64;
    if total == 0 {
        return;
    }

    let mut hist = [0u64; 256];
    for &p in pixels.iter() {
        hist[p as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (level, count) in hist.iter().enumerate() {
        running += count;
        cdf[level] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    let denom = total - cdf_min;
    if denom == 0 {
        return;
    }

    let mut lut = [0u8; 256];
    for (level, slot) in lut.iter_mut().enumerate() {
        let scaled = (cdf[level].saturating_sub(cdf_min) * 255) as f64 / denom as f64;
        *slot = scaled.round().clamp(0.0, 255.0) as u8;
    }

    for p in pixels.iter_mut() {
        *p = lut[*p as usize];
    }
}
