//! Nearest-neighbour matching of a live descriptor against a reference database.

use crate::reference::ReferenceDatabase;
use crate::types::Descriptor;

/// Default Euclidean distance threshold for a positive match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.7;

/// Result of matching a probe descriptor against the reference database.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest reference descriptor (`f32::INFINITY` when
    /// nothing was comparable).
    pub distance: f32,
    /// Label of the nearest identity, present only when `matched`.
    pub label: Option<String>,
}

impl MatchResult {
    fn unmatched(distance: f32) -> Self {
        Self {
            matched: false,
            distance,
            label: None,
        }
    }
}

/// Strategy for comparing a probe descriptor against known identities.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, database: &ReferenceDatabase, threshold: f32) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Scans every descriptor of every identity in database order. Ties keep the
/// first identity encountered. A match requires `distance < threshold`; a
/// distance exactly at the threshold is rejected.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Descriptor, database: &ReferenceDatabase, threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for identity in database.identities() {
            for reference in &identity.descriptors {
                if reference.dim() != probe.dim() {
                    tracing::debug!(
                        label = %identity.label,
                        expected = probe.dim(),
                        got = reference.dim(),
                        "skipping reference descriptor with mismatched dimension"
                    );
                    continue;
                }
                let dist = probe.euclidean_distance(reference);
                if dist < best_dist {
                    best_dist = dist;
                    best_label = Some(&identity.label);
                }
            }
        }

        match best_label {
            Some(label) if best_dist < threshold => MatchResult {
                matched: true,
                distance: best_dist,
                label: Some(label.to_string()),
            },
            _ => MatchResult::unmatched(best_dist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceIdentity;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    fn db(entries: Vec<(&str, Vec<Descriptor>)>) -> ReferenceDatabase {
        ReferenceDatabase::from_identities(
            entries
                .into_iter()
                .map(|(label, descriptors)| ReferenceIdentity {
                    label: label.into(),
                    descriptors,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_identity_wins() {
        let database = db(vec![
            ("ana", vec![d(&[1.0, 0.0]), d(&[0.9, 0.1])]),
            ("luis", vec![d(&[0.0, 1.0])]),
        ]);
        let result = EuclideanMatcher.compare(&d(&[0.1, 0.95]), &database, 0.7);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("luis"));
        assert!(result.distance < 0.2);
    }

    #[test]
    fn test_scans_every_reference() {
        // Best match is the last descriptor of the last identity.
        let database = db(vec![
            ("decoy1", vec![d(&[0.0, 1.0, 0.0])]),
            ("decoy2", vec![d(&[0.0, 0.0, 1.0])]),
            ("match", vec![d(&[0.0, 0.5, 0.5]), d(&[1.0, 0.0, 0.0])]),
        ]);
        let result = EuclideanMatcher.compare(&d(&[1.0, 0.0, 0.0]), &database, 0.7);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("match"));
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_above_threshold_is_unknown() {
        let database = db(vec![("ana", vec![d(&[0.0, 0.0])])]);
        let result = EuclideanMatcher.compare(&d(&[3.0, 4.0]), &database, 0.7);
        assert!(!result.matched);
        assert!(result.label.is_none());
        assert!((result.distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_boundary_rejects_equal_distance() {
        let database = db(vec![("ana", vec![d(&[0.0, 0.0])])]);
        let probe = d(&[3.0, 4.0]);

        let at = EuclideanMatcher.compare(&probe, &database, 5.0);
        assert!(!at.matched, "distance == threshold must be rejected");

        let above = EuclideanMatcher.compare(&probe, &database, 5.0 + 1e-4);
        assert!(above.matched, "distance < threshold must be accepted");
        assert_eq!(above.label.as_deref(), Some("ana"));
    }

    #[test]
    fn test_ties_keep_first_identity() {
        let database = db(vec![
            ("first", vec![d(&[1.0, 0.0])]),
            ("second", vec![d(&[-1.0, 0.0])]),
        ]);
        let result = EuclideanMatcher.compare(&d(&[0.0, 0.0]), &database, 2.0);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("first"));
    }

    #[test]
    fn test_name_only_database_never_matches() {
        let database = ReferenceDatabase::from_names(["ana", "luis"]);
        let result = EuclideanMatcher.compare(&d(&[0.0, 0.0]), &database, 0.7);
        assert!(!result.matched);
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let database = db(vec![("ana", vec![d(&[0.0, 0.0])])]);
        let result = EuclideanMatcher.compare(&d(&[0.0, 0.0, 0.0]), &database, 0.7);
        assert!(!result.matched);
    }
}
