//! Descriptor matching against the known-faces gallery.

use crate::store::KnownFaces;
use crate::types::{Descriptor, PersonId};

/// Default maximum Euclidean distance for two descriptors to count as the same face.
///
/// ArcFace descriptors are unit length, so 0.5 corresponds to a cosine
/// similarity of at least 0.875 (see [`cosine_equivalent`]). That is strict for
/// webcam captures; most galleries want 0.9 to 1.1.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Cosine similarity equivalent to a Euclidean `tolerance` between unit-length
/// descriptors: `|a - b|² = 2 - 2·cos`.
pub fn cosine_equivalent(tolerance: f32) -> f32 {
    1.0 - tolerance * tolerance / 2.0
}

/// Per-entry match flags: `result[i]` is true when `known[i]` is within `tolerance` of `query`.
pub fn compare_faces(known: &[Descriptor], query: &Descriptor, tolerance: f32) -> Vec<bool> {
    known
        .iter()
        .map(|candidate| candidate.distance(query) <= tolerance)
        .collect()
}

/// Result of matching one query descriptor against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Identity of the first gallery entry within tolerance.
    pub person_id: Option<PersonId>,
    /// Index into the gallery of that entry.
    pub index: Option<usize>,
    /// Smallest distance seen across the gallery (infinite for an empty gallery).
    pub best_distance: f32,
}

impl MatchResult {
    pub fn matched(&self) -> bool {
        self.person_id.is_some()
    }
}

/// Strategy for comparing a query descriptor against the known faces.
pub trait Matcher {
    fn compare(&self, query: &Descriptor, known: &KnownFaces) -> MatchResult;
}

/// Euclidean tolerance matcher.
///
/// The first entry within tolerance wins, in gallery order, even if a later
/// entry is closer. The full gallery is still traversed to report the best distance.
#[derive(Debug, Clone, Copy)]
pub struct DistanceMatcher {
    pub tolerance: f32,
}

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Matcher for DistanceMatcher {
    fn compare(&self, query: &Descriptor, known: &KnownFaces) -> MatchResult {
        let flags = compare_faces(known.descriptors(), query, self.tolerance);
        let index = flags.iter().position(|&m| m);

        let best_distance = known
            .descriptors()
            .iter()
            .map(|d| d.distance(query))
            .fold(f32::INFINITY, f32::min);

        MatchResult {
            person_id: index.map(|i| known.person_ids()[i].clone()),
            index,
            best_distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gallery() -> KnownFaces {
        KnownFaces::new(
            vec![
                Descriptor::new(vec![1.0, 0.0, 0.0]),
                Descriptor::new(vec![0.0, 1.0, 0.0]),
                Descriptor::new(vec![0.0, 0.9, 0.0]),
            ],
            vec!["A".into(), "B".into(), "C".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_compare_faces_flags() {
        let known = gallery();
        let query = Descriptor::new(vec![0.0, 0.95, 0.0]);
        let flags = compare_faces(known.descriptors(), &query, 0.5);
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn test_first_match_wins_over_closer_later_entry() {
        // C is closer (0.0) but B comes first and is within tolerance.
        let query = Descriptor::new(vec![0.0, 0.9, 0.0]);
        let result = DistanceMatcher::default().compare(&query, &gallery());
        assert_eq!(result.person_id, Some(PersonId::new("B")));
        assert_eq!(result.index, Some(1));
        assert!(result.best_distance.abs() < 1e-6);
    }

    #[test]
    fn test_no_match_beyond_tolerance() {
        let query = Descriptor::new(vec![0.0, 0.0, 1.0]);
        let result = DistanceMatcher::default().compare(&query, &gallery());
        assert!(!result.matched());
        assert!(result.best_distance > DEFAULT_TOLERANCE);
    }

    #[test]
    fn test_empty_gallery() {
        let known = KnownFaces::new(vec![], vec![]).unwrap();
        let result = DistanceMatcher::default().compare(&Descriptor::new(vec![1.0]), &known);
        assert!(!result.matched());
        assert_eq!(result.best_distance, f32::INFINITY);
    }

    #[test]
    fn test_cosine_equivalent_of_unit_descriptors() {
        assert!((cosine_equivalent(DEFAULT_TOLERANCE) - 0.875).abs() < 1e-6);
        assert!((cosine_equivalent(2.0_f32.sqrt()) - 0.0).abs() < 1e-6);

        // Two unit vectors 60° apart: cos = 0.5, distance = 1.0.
        let a = Descriptor::new(vec![1.0, 0.0]);
        let b = Descriptor::new(vec![0.5, 3.0_f32.sqrt() / 2.0]);
        let d = a.distance(&b);
        assert!((d - 1.0).abs() < 1e-6);
        assert!((cosine_equivalent(d) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let known = KnownFaces::new(vec![Descriptor::new(vec![0.0])], vec!["A".into()]).unwrap();
        let matcher = DistanceMatcher { tolerance: 0.5 };
        assert!(matcher.compare(&Descriptor::new(vec![0.5]), &known).matched());
        assert!(!matcher.compare(&Descriptor::new(vec![0.51]), &known).matched());
    }
}
