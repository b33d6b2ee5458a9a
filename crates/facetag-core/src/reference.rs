//! Reference database: known identities and their descriptors.
//!
//! Stored on disk as a JSON array so that file order is the iteration order
//! used for tie-breaking:
//!
//! ```json
//! [
//!   { "label": "ana",  "descriptors": [[0.01, -0.2, ...], [...]] },
//!   { "label": "luis", "descriptors": [] }
//! ]
//! ```
//!
//! An identity with no descriptors is name-only: it can still be assigned by
//! the deterministic fallback, but never matched.

use crate::types::Descriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("failed to read reference database {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed reference database: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("descriptor for {label:?} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        got: usize,
    },
    #[error("identity label must not be empty")]
    EmptyLabel,
}

/// One known identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceIdentity {
    pub label: String,
    #[serde(default)]
    pub descriptors: Vec<Descriptor>,
}

/// Immutable, ordered label → descriptors mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceDatabase {
    identities: Vec<ReferenceIdentity>,
    dimension: Option<usize>,
}

impl ReferenceDatabase {
    /// Read and validate a database file.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let identities: Vec<ReferenceIdentity> = serde_json::from_str(&raw)?;
        let db = Self::from_identities(identities)?;

        tracing::info!(
            path = %path.display(),
            identities = db.len(),
            descriptors = db.descriptor_count(),
            dimension = ?db.dimension(),
            "loaded reference database"
        );
        Ok(db)
    }

    /// Build a database, merging repeated labels and checking that every
    /// descriptor shares one dimension.
    pub fn from_identities(identities: Vec<ReferenceIdentity>) -> Result<Self, ReferenceError> {
        let mut db = Self::default();
        for identity in identities {
            db.push(identity)?;
        }
        Ok(db)
    }

    /// A database of name-only identities.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut db = Self::default();
        db.add_names(names);
        db
    }

    /// Append name-only identities for labels not already present. Blank
    /// names are ignored.
    pub fn add_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let label: String = name.into().trim().to_string();
            if label.is_empty() || self.contains(&label) {
                continue;
            }
            self.identities.push(ReferenceIdentity {
                label,
                descriptors: Vec::new(),
            });
        }
    }

    fn push(&mut self, identity: ReferenceIdentity) -> Result<(), ReferenceError> {
        let label = identity.label.trim().to_string();
        if label.is_empty() {
            return Err(ReferenceError::EmptyLabel);
        }

        for descriptor in &identity.descriptors {
            let got = descriptor.dim();
            match self.dimension {
                None => self.dimension = Some(got),
                Some(expected) if expected != got => {
                    return Err(ReferenceError::DimensionMismatch {
                        label,
                        expected,
                        got,
                    });
                }
                Some(_) => {}
            }
        }

        match self.identities.iter_mut().find(|i| i.label == label) {
            Some(existing) => existing.descriptors.extend(identity.descriptors),
            None => self.identities.push(ReferenceIdentity {
                label,
                descriptors: identity.descriptors,
            }),
        }
        Ok(())
    }

    pub fn identities(&self) -> &[ReferenceIdentity] {
        &self.identities
    }

    /// All known labels, in database order.
    pub fn labels(&self) -> Vec<&str> {
        self.identities.iter().map(|i| i.label.as_str()).collect()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.identities.iter().any(|i| i.label == label)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn descriptor_count(&self) -> usize {
        self.identities.iter().map(|i| i.descriptors.len()).sum()
    }

    /// Whether at least one identity carries a real descriptor.
    pub fn has_descriptors(&self) -> bool {
        self.descriptor_count() > 0
    }

    /// Shared descriptor dimension, if any descriptor is present.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_db(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_preserves_file_order() {
        let file = write_db(
            r#"[
                {"label": "zoe", "descriptors": [[0.0, 1.0]]},
                {"label": "ana", "descriptors": [[1.0, 0.0], [0.5, 0.5]]},
                {"label": "luis"}
            ]"#,
        );
        let db = ReferenceDatabase::load(file.path()).unwrap();
        assert_eq!(db.labels(), vec!["zoe", "ana", "luis"]);
        assert_eq!(db.descriptor_count(), 3);
        assert_eq!(db.dimension(), Some(2));
        assert!(db.has_descriptors());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ReferenceDatabase::load(Path::new("/nonexistent/faces.json")).unwrap_err();
        assert!(matches!(err, ReferenceError::Io { .. }));
    }

    #[test]
    fn test_load_malformed() {
        let file = write_db("{not json");
        let err = ReferenceDatabase::load(file.path()).unwrap_err();
        assert!(matches!(err, ReferenceError::Parse(_)));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let file = write_db(
            r#"[
                {"label": "ana", "descriptors": [[1.0, 0.0]]},
                {"label": "luis", "descriptors": [[1.0, 0.0, 0.0]]}
            ]"#,
        );
        let err = ReferenceDatabase::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ReferenceError::DimensionMismatch { expected: 2, got: 3, .. }
        ));
    }

    #[test]
    fn test_repeated_labels_merge() {
        let db = ReferenceDatabase::from_identities(vec![
            ReferenceIdentity { label: "ana".into(), descriptors: vec![Descriptor::new(vec![1.0])] },
            ReferenceIdentity { label: "luis".into(), descriptors: vec![] },
            ReferenceIdentity { label: " ana ".into(), descriptors: vec![Descriptor::new(vec![2.0])] },
        ])
        .unwrap();
        assert_eq!(db.labels(), vec!["ana", "luis"]);
        assert_eq!(db.identities()[0].descriptors.len(), 2);
    }

    #[test]
    fn test_empty_label_rejected() {
        let err = ReferenceDatabase::from_identities(vec![ReferenceIdentity {
            label: "  ".into(),
            descriptors: vec![],
        }])
        .unwrap_err();
        assert!(matches!(err, ReferenceError::EmptyLabel));
    }

    #[test]
    fn test_add_names_skips_duplicates_and_blanks() {
        let mut db = ReferenceDatabase::from_names(["ana", "luis"]);
        db.add_names(["luis", "", "marta"]);
        assert_eq!(db.labels(), vec!["ana", "luis", "marta"]);
        assert!(!db.has_descriptors());
        assert_eq!(db.dimension(), None);
    }
}
