//! Identity resolution: nearest enrolled embedding under a distance threshold.

use crate::types::{Embedding, EnrolledIdentity, MatchError, MatchResult};

/// Default Euclidean distance threshold. Smaller is stricter.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// Strategy for comparing a probe embedding against the enrolled population.
pub trait Matcher {
    fn resolve(
        &self,
        probe: &Embedding,
        candidates: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Minimum Euclidean distance matcher.
///
/// Candidates without an embedding are skipped. Ties keep the candidate seen
/// first, so callers must supply a stable ordering for reproducible results.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn resolve(
        &self,
        probe: &Embedding,
        candidates: &[EnrolledIdentity],
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        let mut best: Option<(&EnrolledIdentity, f32)> = None;

        for candidate in candidates {
            let Some(stored) = &candidate.embedding else {
                continue;
            };
            let distance = probe.distance(stored)?;
            let closer = match best {
                None => true,
                Some((_, best_distance)) => distance < best_distance,
            };
            if closer {
                best = Some((candidate, distance));
            }
        }

        match best {
            Some((candidate, distance)) if distance < threshold => {
                tracing::debug!(
                    employee_id = %candidate.employee_id,
                    distance,
                    threshold,
                    "probe identified"
                );
                Ok(MatchResult::Identified {
                    employee_id: candidate.employee_id.clone(),
                    distance,
                })
            }
            Some((_, distance)) => {
                tracing::debug!(distance, threshold, "closest candidate above threshold");
                Ok(MatchResult::NoMatch)
            }
            None => Ok(MatchResult::NoMatch),
        }
    }
}

/// Resolve with the [`EuclideanMatcher`].
pub fn resolve(
    probe: &Embedding,
    candidates: &[EnrolledIdentity],
    threshold: f32,
) -> Result<MatchResult, MatchError> {
    EuclideanMatcher.resolve(probe, candidates, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embedding on the first axis, so its distance from the origin probe is `d`.
    fn at_distance(d: f32) -> Embedding {
        Embedding::new(vec![d, 0.0, 0.0]).unwrap()
    }

    fn origin() -> Embedding {
        Embedding::new(vec![0.0, 0.0, 0.0]).unwrap()
    }

    fn candidate(id: &str, d: f32) -> EnrolledIdentity {
        EnrolledIdentity::new(id, Some(at_distance(d)))
    }

    #[test]
    fn test_minimum_distance_wins() {
        let candidates = vec![candidate("E1", 0.3), candidate("E2", 0.5)];
        let result = resolve(&origin(), &candidates, 0.6).unwrap();
        match result {
            MatchResult::Identified { employee_id, distance } => {
                assert_eq!(employee_id, "E1");
                assert!((distance - 0.3).abs() < 1e-6);
            }
            MatchResult::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_minimum_found_regardless_of_position() {
        let candidates = vec![
            candidate("far", 0.55),
            candidate("mid", 0.4),
            candidate("near", 0.1),
        ];
        let result = resolve(&origin(), &candidates, 0.6).unwrap();
        assert_eq!(result.employee_id(), Some("near"));
    }

    #[test]
    fn test_all_above_threshold_is_no_match() {
        let candidates = vec![candidate("E1", 0.7), candidate("E2", 0.9)];
        assert_eq!(resolve(&origin(), &candidates, 0.6).unwrap(), MatchResult::NoMatch);
    }

    #[test]
    fn test_distance_equal_to_threshold_is_rejected() {
        let candidates = vec![candidate("E1", 0.5)];
        assert_eq!(resolve(&origin(), &candidates, 0.5).unwrap(), MatchResult::NoMatch);
    }

    #[test]
    fn test_empty_population_is_no_match() {
        assert_eq!(resolve(&origin(), &[], DEFAULT_THRESHOLD).unwrap(), MatchResult::NoMatch);
    }

    #[test]
    fn test_unenrolled_candidates_are_skipped() {
        let candidates = vec![
            EnrolledIdentity::new("nobody", None),
            candidate("E2", 0.2),
            EnrolledIdentity::new("also-nobody", None),
        ];
        let result = resolve(&origin(), &candidates, 0.6).unwrap();
        assert_eq!(result.employee_id(), Some("E2"));

        let only_unenrolled = vec![EnrolledIdentity::new("nobody", None)];
        assert_eq!(resolve(&origin(), &only_unenrolled, 0.6).unwrap(), MatchResult::NoMatch);
    }

    #[test]
    fn test_tie_keeps_first_in_order() {
        let candidates = vec![candidate("A", 0.25), candidate("B", 0.25)];
        assert_eq!(resolve(&origin(), &candidates, 0.6).unwrap().employee_id(), Some("A"));

        let reversed = vec![candidate("B", 0.25), candidate("A", 0.25)];
        assert_eq!(resolve(&origin(), &reversed, 0.6).unwrap().employee_id(), Some("B"));
    }

    #[test]
    fn test_dimension_mismatch_aborts() {
        let candidates = vec![EnrolledIdentity::new(
            "short",
            Some(Embedding::new(vec![0.1, 0.2]).unwrap()),
        )];
        assert_eq!(
            resolve(&origin(), &candidates, 0.6),
            Err(MatchError::DimensionMismatch { left: 3, right: 2 })
        );
    }

    #[test]
    fn test_resolve_does_not_mutate_inputs() {
        let probe = origin();
        let candidates = vec![candidate("E1", 0.3), EnrolledIdentity::new("E2", None)];
        let before = candidates.clone();
        let first = resolve(&probe, &candidates, 0.6).unwrap();
        let second = resolve(&probe, &candidates, 0.6).unwrap();
        assert_eq!(candidates, before);
        assert_eq!(first, second);
    }
}
