//! Identity resolution.
//!
//! Per face: fingerprint the crop, bucket its box, consult the identity
//! memory, and on a miss fall through to descriptor matching or the
//! deterministic name pick. Failures stay local to the face that caused them.

use crate::fingerprint::FingerprintGenerator;
use crate::matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::memory::{IdentityMemory, MemoryKey};
use crate::models::{InitError, Models, Ready, Strategy};
use crate::types::{BoundingBox, FaceCrop, Identity, PositionBucket, Sentinels};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_BUCKET_SIZE: u32 = 20;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("empty face crop ({width}x{height})")]
    EmptyCrop { width: u32, height: u32 },
    #[error("corrupt face crop: {actual} bytes for {width}x{height}x{channels}")]
    CorruptCrop {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },
}

/// Terminal state reached by a single resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    MemoryHit,
    /// Descriptor within threshold of a reference identity.
    Matched,
    /// Descriptor available but nothing close enough, or extraction failed.
    Unmatched,
    /// Deterministic pick from the fingerprint.
    Assigned,
    /// No identities are known at all.
    NoIdentities,
    /// The crop was empty.
    Rejected,
    /// The pipeline failed for this face.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: Identity,
    pub state: ResolutionState,
}

impl Resolution {
    fn new(identity: Identity, state: ResolutionState) -> Self {
        Self { identity, state }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub bucket_size: u32,
    pub match_threshold: f32,
    pub sentinels: Sentinels,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            sentinels: Sentinels::default(),
        }
    }
}

/// Resolves faces to identity labels. Safe to share across threads.
pub struct IdentityResolver {
    models: Arc<Models>,
    memory: Arc<IdentityMemory>,
    fingerprinter: FingerprintGenerator,
    matcher: Box<dyn Matcher + Send + Sync>,
    settings: ResolverSettings,
}

impl IdentityResolver {
    pub fn new(models: Arc<Models>, memory: Arc<IdentityMemory>, settings: ResolverSettings) -> Self {
        Self {
            models,
            memory,
            fingerprinter: FingerprintGenerator::default(),
            matcher: Box::new(EuclideanMatcher),
            settings,
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn Matcher + Send + Sync>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn memory(&self) -> &Arc<IdentityMemory> {
        &self.memory
    }

    pub fn models(&self) -> &Arc<Models> {
        &self.models
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve every face box in `frame` to a label.
    ///
    /// Boxes outside the frame or with non-positive size are skipped. Labels
    /// are deduplicated in first-seen order. When nothing resolves, the
    /// result is exactly the no-face sentinel. Only model initialization
    /// failures abort the whole frame.
    pub fn resolve_identities(
        &self,
        frame: &RgbImage,
        boxes: &[BoundingBox],
    ) -> Result<Vec<String>, InitError> {
        let ready = self.models.ensure_ready()?;
        let mut identities: Vec<String> = Vec::new();

        for bbox in boxes {
            if !bbox.fits(frame.width(), frame.height()) {
                tracing::debug!(?bbox, "skipping box outside frame");
                continue;
            }
            let crop = FaceCrop::from_frame(frame, bbox);
            let resolution = self.resolve_crop(ready, &crop, bbox);
            let label = self.settings.sentinels.label(&resolution.identity);
            if !identities.contains(&label) {
                identities.push(label);
            }
        }

        if identities.is_empty() {
            identities.push(self.settings.sentinels.no_face.clone());
        }
        Ok(identities)
    }

    /// Resolve one face crop taken from `bbox`.
    pub fn resolve_crop(&self, ready: &Ready, crop: &FaceCrop, bbox: &BoundingBox) -> Resolution {
        match self.try_resolve(ready, crop, bbox) {
            Ok(resolution) => resolution,
            Err(e @ ResolveError::EmptyCrop { .. }) => {
                tracing::debug!(error = %e, "face rejected");
                Resolution::new(Identity::Unknown, ResolutionState::Rejected)
            }
            Err(e) => {
                tracing::warn!(error = %e, "face resolution failed");
                Resolution::new(Identity::Error, ResolutionState::Failed)
            }
        }
    }

    fn try_resolve(
        &self,
        ready: &Ready,
        crop: &FaceCrop,
        bbox: &BoundingBox,
    ) -> Result<Resolution, ResolveError> {
        if crop.is_empty() {
            return Err(ResolveError::EmptyCrop {
                width: crop.width,
                height: crop.height,
            });
        }
        // Rejects every crop `normalize` could fail on, so the fingerprint
        // below never takes its clock fallback.
        if !crop.is_well_formed() {
            return Err(ResolveError::CorruptCrop {
                width: crop.width,
                height: crop.height,
                channels: crop.channels,
                actual: crop.data.len(),
            });
        }

        let fingerprint = self.fingerprinter.fingerprint(crop);
        let bucket = PositionBucket::from_box(bbox, self.settings.bucket_size);
        let key = MemoryKey::new(&fingerprint, &bucket);

        if let Some(label) = self.memory.lookup(&key) {
            tracing::debug!(key = key.as_str(), %label, "memory hit");
            return Ok(Resolution::new(Identity::Named(label), ResolutionState::MemoryHit));
        }

        let resolution = match ready.strategy() {
            Strategy::Descriptor => self.match_descriptor(ready, crop),
            Strategy::NameOnly => {
                let labels = ready.database().labels();
                match fingerprint.index(labels.len()) {
                    Some(idx) => Resolution::new(
                        Identity::Named(labels[idx].to_string()),
                        ResolutionState::Assigned,
                    ),
                    None => Resolution::new(Identity::Unknown, ResolutionState::NoIdentities),
                }
            }
            Strategy::None => Resolution::new(Identity::Unknown, ResolutionState::NoIdentities),
        };

        // Unknown is never cached: a later sighting may still match.
        if let Identity::Named(label) = &resolution.identity {
            self.memory.insert(key.clone(), label.clone());
        }
        tracing::debug!(key = key.as_str(), state = ?resolution.state, "memory miss resolved");
        Ok(resolution)
    }

    fn match_descriptor(&self, ready: &Ready, crop: &FaceCrop) -> Resolution {
        let unmatched = Resolution::new(Identity::Unknown, ResolutionState::Unmatched);
        let Some(extractor) = ready.extractor() else {
            return unmatched;
        };

        let descriptor = match extractor.lock().extract(crop) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "descriptor extraction failed");
                return unmatched;
            }
        };

        let result = self
            .matcher
            .compare(&descriptor, ready.database(), self.settings.match_threshold);
        tracing::debug!(matched = result.matched, distance = result.distance, "descriptor compared");

        match result.label {
            Some(label) if result.matched => Resolution::new(Identity::Named(label), ResolutionState::Matched),
            _ => unmatched,
        }
    }
}
