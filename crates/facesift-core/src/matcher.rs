//! Vote-based identity matching.

use crate::registry::IdentityRegistry;
use crate::types::{Encoding, MatchResult};

/// Thresholds governing when reference votes add up to a match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// A reference votes iff its distance is strictly below this.
    pub distance_threshold: f32,
    /// Votes an identity needs before it can win.
    pub min_votes: usize,
}

/// Pick the best-matching identity for one face encoding.
///
/// Every identity is scored against all of its reference encodings; a
/// reference votes when its distance to the probe falls strictly below the
/// policy threshold. An identity with fewer than `min_votes` votes is not a
/// candidate even if it holds the globally smallest distance. Among
/// candidates, the smallest best-vote distance wins; an exact tie goes to
/// the lexicographically smaller identity name (registry iteration order).
///
/// Returns `None` when no identity qualifies.
pub fn best_match(
    encoding: &Encoding,
    registry: &IdentityRegistry,
    policy: &MatchPolicy,
) -> Option<MatchResult> {
    let mut winner: Option<MatchResult> = None;

    for (identity, references) in registry.identities() {
        let mut votes = 0usize;
        let mut best = f32::INFINITY;

        for reference in references {
            let distance = reference.distance(encoding);
            if distance < policy.distance_threshold {
                votes += 1;
                if distance < best {
                    best = distance;
                }
            }
        }

        // A voteless identity has no distance to rank by, so even
        // min_votes = 0 requires at least one vote.
        if votes == 0 || votes < policy.min_votes {
            continue;
        }

        tracing::debug!(
            %identity,
            votes_matched = votes,
            votes_total = references.len(),
            best_distance = best,
            "candidate identity"
        );

        let improves = match &winner {
            None => true,
            Some(current) => best < current.best_distance,
        };
        if improves {
            winner = Some(MatchResult {
                identity: identity.to_string(),
                best_distance: best,
                votes_matched: votes,
                votes_total: references.len(),
            });
        }
    }

    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(x: f32) -> Encoding {
        Encoding::new(vec![x])
    }

    fn registry(entries: &[(&str, &[f32])]) -> IdentityRegistry {
        IdentityRegistry::from_entries(entries.iter().map(|(name, values)| {
            (
                name.to_string(),
                values.iter().map(|v| enc(*v)).collect::<Vec<_>>(),
            )
        }))
    }

    fn policy(threshold: f32, min_votes: usize) -> MatchPolicy {
        MatchPolicy { distance_threshold: threshold, min_votes }
    }

    #[test]
    fn test_votes_below_minimum_disqualify() {
        // One reference within threshold, but two votes required.
        let registry = registry(&[("alice", &[0.3, 5.0, 5.0])]);
        assert!(best_match(&enc(0.0), &registry, &policy(0.6, 2)).is_none());
    }

    #[test]
    fn test_enough_votes_match() {
        // References at distances 0.3, 0.5 and 0.9: two clear the 0.6
        // threshold, so alice qualifies with best distance 0.3.
        let registry = registry(&[("alice", &[0.3, 0.5, 0.9])]);
        let result = best_match(&enc(0.0), &registry, &policy(0.6, 2)).unwrap();
        assert_eq!(result.identity, "alice");
        assert!((result.best_distance - 0.3).abs() < 1e-6);
        assert_eq!(result.votes_matched, 2);
        assert_eq!(result.votes_total, 3);
    }

    #[test]
    fn test_globally_closest_loses_without_quorum() {
        // bob holds the smallest distance overall (0.3) but only one vote;
        // alice qualifies and wins despite a larger best distance.
        let registry = registry(&[("alice", &[0.4, 0.5]), ("bob", &[0.3, 0.7, 0.8])]);
        let result = best_match(&enc(0.0), &registry, &policy(0.6, 2)).unwrap();
        assert_eq!(result.identity, "alice");
        assert!((result.best_distance - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_single_underqualified_identity_no_match() {
        // One vote at 0.3, the rest outside threshold: no candidate at all.
        let registry = registry(&[("bob", &[0.3, 0.7, 0.8])]);
        assert!(best_match(&enc(0.0), &registry, &policy(0.6, 2)).is_none());
    }

    #[test]
    fn test_smallest_best_distance_wins() {
        let registry = registry(&[("alice", &[0.4, 0.5]), ("bob", &[0.2, 0.3])]);
        let result = best_match(&enc(0.0), &registry, &policy(0.6, 2)).unwrap();
        assert_eq!(result.identity, "bob");
        assert!((result.best_distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Distance exactly at the threshold does not vote.
        let registry = registry(&[("alice", &[0.6, 0.6])]);
        assert!(best_match(&enc(0.0), &registry, &policy(0.6, 2)).is_none());
    }

    #[test]
    fn test_tie_breaks_to_lexicographic_first() {
        let registry = registry(&[("zara", &[0.3, 0.3]), ("alice", &[0.3, 0.3])]);
        let result = best_match(&enc(0.0), &registry, &policy(0.6, 2)).unwrap();
        assert_eq!(result.identity, "alice");
    }

    #[test]
    fn test_min_votes_zero_still_needs_one_vote() {
        let registry = registry(&[("alice", &[5.0])]);
        assert!(best_match(&enc(0.0), &registry, &policy(0.6, 0)).is_none());

        let registry = registry(&[("alice", &[0.2])]);
        let result = best_match(&enc(0.0), &registry, &policy(0.6, 0)).unwrap();
        assert_eq!(result.votes_matched, 1);
    }

    #[test]
    fn test_empty_registry_no_match() {
        let registry = IdentityRegistry::default();
        assert!(best_match(&enc(0.0), &registry, &policy(0.6, 2)).is_none());
    }

    #[test]
    fn test_identities_scored_independently() {
        // carol's references near the probe do not lend votes to bob.
        let registry = registry(&[("bob", &[0.3, 5.0]), ("carol", &[0.2, 0.25])]);
        let result = best_match(&enc(0.0), &registry, &policy(0.6, 2)).unwrap();
        assert_eq!(result.identity, "carol");
        assert_eq!(result.votes_matched, 2);
    }
}
