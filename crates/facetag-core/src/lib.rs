//! facetag-core — Session-stable face identity assignment.
//!
//! Fingerprints face crops, remembers assigned labels in a bounded memory,
//! and falls back from descriptor matching to a deterministic name pick when
//! no embedding model or reference descriptors are available.

pub mod extractor;
pub mod fingerprint;
pub mod matcher;
pub mod memory;
pub mod models;
pub mod reference;
pub mod resolver;
pub mod types;

pub use extractor::{DescriptorExtractor, OnnxExtractor};
pub use fingerprint::{Fingerprint, FingerprintGenerator};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher};
pub use memory::{IdentityMemory, MemoryConfig, MemoryKey};
pub use models::{InitError, ModelPaths, Models, Ready, Strategy};
pub use reference::{ReferenceDatabase, ReferenceIdentity};
pub use resolver::{IdentityResolver, Resolution, ResolutionState, ResolverSettings};
pub use types::{BoundingBox, Descriptor, FaceCrop, Identity, PositionBucket, RelativeBox, Sentinels};
