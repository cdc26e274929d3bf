// SPDX-License-Identifier: MIT OR Apache-2.0
//! The project resolver seam.
//!
//! Resolution backends are injected at construction; the normaliser only
//! sees this one-method trait.

use async_trait::async_trait;
use intake_core::Candidate;

/// Scored candidate search for a fuzzy project selector.
#[async_trait]
pub trait ProjectResolver: Send + Sync {
    /// Return candidates for `selector`, best first or unordered.
    /// Implementations swallow transport failures and return an empty list.
    async fn resolve(&self, selector: &str) -> Vec<Candidate>;
}

/// Resolver that never finds anything. Used when no search backend is
/// configured; every project selector then becomes a clarification.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubProjectResolver;

#[async_trait]
impl ProjectResolver for StubProjectResolver {
    async fn resolve(&self, _selector: &str) -> Vec<Candidate> {
        Vec::new()
    }
}

/// Resolver with a fixed candidate list, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticProjectResolver {
    /// Candidates returned for every selector.
    pub candidates: Vec<Candidate>,
}

impl StaticProjectResolver {
    /// Build a resolver that always returns `candidates`.
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl ProjectResolver for StaticProjectResolver {
    async fn resolve(&self, _selector: &str) -> Vec<Candidate> {
        self.candidates.clone()
    }
}

/// Pick the winning candidate under the threshold + margin rule.
///
/// The top candidate wins iff its score reaches `threshold` and leads the
/// runner-up by at least `margin`. A missing score counts as zero; a single
/// candidate has no runner-up, so only the threshold applies.
pub fn select_candidate(
    candidates: &[Candidate],
    threshold: f64,
    margin: f64,
) -> Option<&Candidate> {
    let mut scored: Vec<(f64, &Candidate)> = candidates
        .iter()
        .map(|c| (c.score.unwrap_or(0.0), c))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let (top_score, top) = *scored.first()?;
    if top_score < threshold {
        return None;
    }
    if let Some((second_score, _)) = scored.get(1)
        && (top_score - second_score) < margin
    {
        return None;
    }
    Some(top)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate {
            id: id.into(),
            label: format!("Project {id}"),
            score: Some(score),
            meta: None,
        }
    }

    #[tokio::test]
    async fn stub_resolver_returns_nothing() {
        assert!(StubProjectResolver.resolve("anything").await.is_empty());
    }

    #[test]
    fn empty_candidate_list_selects_nothing() {
        assert!(select_candidate(&[], 0.9, 0.1).is_none());
    }

    #[test]
    fn top_below_threshold_selects_nothing() {
        let candidates = vec![candidate("a", 0.89)];
        assert!(select_candidate(&candidates, 0.9, 0.1).is_none());
    }

    #[test]
    fn score_exactly_at_threshold_is_accepted() {
        let candidates = vec![candidate("a", 0.9)];
        assert_eq!(select_candidate(&candidates, 0.9, 0.1).unwrap().id, "a");
    }

    #[test]
    fn near_tie_is_eliminated_by_margin() {
        let candidates = vec![candidate("a", 0.95), candidate("b", 0.90)];
        assert!(select_candidate(&candidates, 0.9, 0.1).is_none());
    }

    #[test]
    fn margin_exactly_met_is_accepted() {
        let candidates = vec![candidate("a", 0.95), candidate("b", 0.85)];
        assert_eq!(select_candidate(&candidates, 0.9, 0.1).unwrap().id, "a");
    }

    #[test]
    fn unsorted_input_is_handled() {
        let candidates = vec![candidate("low", 0.2), candidate("high", 0.99)];
        assert_eq!(select_candidate(&candidates, 0.9, 0.1).unwrap().id, "high");
    }

    #[test]
    fn missing_score_counts_as_zero() {
        let mut unscored = candidate("a", 0.0);
        unscored.score = None;
        assert!(select_candidate(&[unscored], 0.9, 0.1).is_none());
    }
}
