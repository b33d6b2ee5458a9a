//! Model readiness.
//!
//! `Models` owns the paths to the optional descriptor model and reference
//! database and initializes them at most once. `ensure_ready()` is idempotent
//! and safe to race: concurrent first callers block on a single
//! initialization and all observe the same [`Ready`] capability.
//!
//! A missing or unloadable descriptor model and a missing reference database
//! are not errors. They select a weaker resolution strategy. Only a malformed
//! reference database fails initialization.

use crate::extractor::{DescriptorExtractor, OnnxExtractor};
use crate::reference::{ReferenceDatabase, ReferenceError};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("reference database: {0}")]
    Reference(#[from] ReferenceError),
}

/// How unmatched faces are resolved, fixed once models are ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Real descriptors: nearest-neighbour match against the reference database.
    Descriptor,
    /// Names but no usable descriptors: deterministic pick from the fingerprint.
    NameOnly,
    /// Nothing known: every face is unknown.
    None,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Descriptor => "descriptor",
            Strategy::NameOnly => "name_only",
            Strategy::None => "none",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where to find model resources.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    /// ONNX descriptor model. Skipped when absent or missing on disk.
    pub descriptor_model: Option<PathBuf>,
    /// JSON reference database. Skipped when absent or missing on disk.
    pub reference_db: Option<PathBuf>,
    /// Extra name-only identities appended after the database labels.
    pub known_names: Vec<String>,
}

/// Initialized models, shared read-only by every resolution.
pub struct Ready {
    extractor: Option<Mutex<Box<dyn DescriptorExtractor>>>,
    database: ReferenceDatabase,
    strategy: Strategy,
}

impl Ready {
    pub fn new(extractor: Option<Box<dyn DescriptorExtractor>>, database: ReferenceDatabase) -> Self {
        let strategy = match (&extractor, database.has_descriptors(), database.is_empty()) {
            (Some(_), true, _) => Strategy::Descriptor,
            (_, _, false) => Strategy::NameOnly,
            _ => Strategy::None,
        };
        Self {
            extractor: extractor.map(Mutex::new),
            database,
            strategy,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn database(&self) -> &ReferenceDatabase {
        &self.database
    }

    pub fn has_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    pub(crate) fn extractor(&self) -> Option<&Mutex<Box<dyn DescriptorExtractor>>> {
        self.extractor.as_ref()
    }
}

/// Lazily initialized model capability.
pub struct Models {
    paths: ModelPaths,
    ready: OnceCell<Ready>,
}

impl Models {
    pub fn new(paths: ModelPaths) -> Self {
        Self {
            paths,
            ready: OnceCell::new(),
        }
    }

    /// A capability that is already initialized.
    pub fn from_ready(ready: Ready) -> Self {
        Self {
            paths: ModelPaths::default(),
            ready: OnceCell::with_value(ready),
        }
    }

    /// Initialize on first call and return the shared capability.
    ///
    /// A failed initialization leaves the cell empty, so the next call retries.
    pub fn ensure_ready(&self) -> Result<&Ready, InitError> {
        self.ready.get_or_try_init(|| load(&self.paths))
    }

    /// The capability if already initialized; never triggers loading.
    pub fn get(&self) -> Option<&Ready> {
        self.ready.get()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }
}

fn load(paths: &ModelPaths) -> Result<Ready, InitError> {
    tracing::info!("initializing models");

    let mut database = match &paths.reference_db {
        Some(path) if path.exists() => ReferenceDatabase::load(path)?,
        Some(path) => {
            tracing::warn!(path = %path.display(), "reference database not found; descriptor matching disabled");
            ReferenceDatabase::default()
        }
        None => ReferenceDatabase::default(),
    };
    database.add_names(paths.known_names.iter().cloned());

    let extractor: Option<Box<dyn DescriptorExtractor>> = match &paths.descriptor_model {
        Some(path) if !path.exists() => {
            tracing::warn!(path = %path.display(), "descriptor model not found; falling back to deterministic assignment");
            None
        }
        Some(_) if !database.has_descriptors() => {
            tracing::warn!("reference database has no descriptors; descriptor model not loaded");
            None
        }
        Some(path) => match OnnxExtractor::load(path) {
            Ok(extractor) => Some(Box::new(extractor)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "descriptor model unusable; falling back to deterministic assignment");
                None
            }
        },
        None => None,
    };

    let ready = Ready::new(extractor, database);
    tracing::info!(
        strategy = %ready.strategy(),
        identities = ready.database().len(),
        "models ready"
    );
    Ok(ready)
}
