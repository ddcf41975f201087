//! Ranking aggregator: confidence-weighted positional scoring.
//!
//! Borda-style. In a ballot over `k` candidates the best rank earns `k-1`
//! points and the worst earns 0; each ballot's points are scaled by its
//! reviewer's confidence before summing. A member no valid ballot mentions
//! is reported as unranked, which is distinct from earning a genuine 0.0,
//! and always sorts after the ranked block.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anonymizer::LabelMap;
use crate::member::MemberId;
use crate::reviewer::ReviewResult;

/// One de-anonymized entry in the consensus ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMember {
    pub member: MemberId,
    /// Sum of confidence-scaled Borda points across ballots.
    pub score: f64,
    /// Mean confidence of the ballots that ranked this member.
    pub average_confidence: f64,
    /// Number of valid ballots that ranked this member. Zero marks the
    /// member unranked.
    pub review_count: usize,
}

impl RankedMember {
    pub fn is_ranked(&self) -> bool {
        self.review_count > 0
    }
}

/// Consensus ordering, best first. Derived, never persisted on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusRanking {
    pub entries: Vec<RankedMember>,
}

impl ConsensusRanking {
    pub fn top(&self) -> Option<&RankedMember> {
        self.entries.first()
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberId> {
        self.entries.iter().map(|entry| &entry.member)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct Tally {
    score: f64,
    confidence_sum: f64,
    ballots: usize,
}

/// Fold valid ballots into a single de-anonymized consensus ordering.
///
/// Every member in the label map gets an entry, ranked or not, so the
/// output set always equals the set of successful Stage-1 members.
pub fn aggregate(reviews: &[ReviewResult], labels: &LabelMap) -> ConsensusRanking {
    let mut tallies: HashMap<&str, Tally> = HashMap::new();

    for review in reviews {
        let k = review.ranking.len();
        for (position, label) in review.ranking.iter().enumerate() {
            let points = (k - 1 - position) as f64;
            let tally = tallies.entry(label.as_str()).or_default();
            tally.score += points * review.confidence;
            tally.confidence_sum += review.confidence;
            tally.ballots += 1;
        }
    }

    let mut entries: Vec<RankedMember> = labels
        .members()
        .map(|(member, label)| match tallies.get(label) {
            Some(tally) => RankedMember {
                member: member.clone(),
                score: tally.score,
                average_confidence: tally.confidence_sum / tally.ballots as f64,
                review_count: tally.ballots,
            },
            None => RankedMember {
                member: member.clone(),
                score: 0.0,
                average_confidence: 0.0,
                review_count: 0,
            },
        })
        .collect();

    entries.sort_by(compare_entries);

    debug!(
        entries = entries.len(),
        ballots = reviews.len(),
        "consensus ranking computed"
    );
    ConsensusRanking { entries }
}

/// Total order over entries: ranked before unranked, then score descending,
/// then average confidence descending, then member id ascending. The last
/// rule exists only to make the output deterministic.
fn compare_entries(a: &RankedMember, b: &RankedMember) -> Ordering {
    match (a.is_ranked(), b.is_ranked()) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.average_confidence
                .partial_cmp(&a.average_confidence)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.member.cmp(&b.member))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::anonymize;
    use crate::collector::MemberResponse;

    fn label_map(ids: &[&str]) -> LabelMap {
        let responses: Vec<MemberResponse> = ids
            .iter()
            .map(|id| MemberResponse::success(MemberId::new(*id), "answer"))
            .collect();
        anonymize(&responses, true).1
    }

    fn review(reviewer: &str, ranking: &[&str], confidence: f64) -> ReviewResult {
        ReviewResult {
            reviewer: MemberId::new(reviewer),
            ranking: ranking.iter().map(|l| l.to_string()).collect(),
            reasoning: String::new(),
            confidence,
        }
    }

    #[test]
    fn borda_points_are_scaled_by_confidence() {
        // alpha=A, bravo=B, charlie=C.
        let labels = label_map(&["alpha", "bravo", "charlie"]);
        let reviews = vec![
            review("alpha", &["Response B", "Response C"], 1.0),
            review("bravo", &["Response C", "Response A"], 0.5),
            review("charlie", &["Response A", "Response B"], 1.0),
        ];

        let ranking = aggregate(&reviews, &labels);

        // Scores: A = 1.0 (from charlie), B = 1.0 (from alpha), C = 0.5.
        // A and B tie on score; B wins the tie on average confidence
        // (1.0 vs 0.75).
        let order: Vec<&str> = ranking.members().map(MemberId::as_str).collect();
        assert_eq!(order, ["bravo", "alpha", "charlie"]);
        assert!((ranking.entries[0].score - 1.0).abs() < 1e-9);
        assert!((ranking.entries[2].score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unranked_members_sort_after_ranked_ones() {
        let labels = label_map(&["alpha", "bravo", "charlie"]);
        // Only one valid ballot, ranking B then C; A is never mentioned.
        let reviews = vec![review("alpha", &["Response B", "Response C"], 0.9)];

        let ranking = aggregate(&reviews, &labels);
        let order: Vec<&str> = ranking.members().map(MemberId::as_str).collect();

        // charlie scored 0.0 from a real ballot; alpha is unranked and must
        // come last even though both "scores" are comparable.
        assert_eq!(order, ["bravo", "charlie", "alpha"]);
        assert!(ranking.entries[1].is_ranked());
        assert_eq!(ranking.entries[1].score, 0.0);
        assert!(!ranking.entries[2].is_ranked());
    }

    #[test]
    fn zero_reviews_yields_all_unranked_by_member_id() {
        let labels = label_map(&["charlie", "alpha", "bravo"]);
        let ranking = aggregate(&[], &labels);

        let order: Vec<&str> = ranking.members().map(MemberId::as_str).collect();
        assert_eq!(order, ["alpha", "bravo", "charlie"]);
        assert!(ranking.entries.iter().all(|e| !e.is_ranked()));
    }

    #[test]
    fn full_tie_breaks_on_member_id() {
        let labels = label_map(&["bravo", "alpha"]);
        // Two symmetric ballots: each ranks only the other, same confidence.
        let reviews = vec![
            review("bravo", &["Response B"], 0.8),
            review("alpha", &["Response A"], 0.8),
        ];

        let ranking = aggregate(&reviews, &labels);
        let order: Vec<&str> = ranking.members().map(MemberId::as_str).collect();
        assert_eq!(order, ["alpha", "bravo"]);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let labels = label_map(&["alpha", "bravo", "charlie", "delta"]);
        let reviews = vec![
            review("alpha", &["Response B", "Response C", "Response D"], 0.7),
            review("bravo", &["Response C", "Response A", "Response D"], 0.9),
            review("charlie", &["Response A", "Response B", "Response D"], 0.6),
        ];

        let first = aggregate(&reviews, &labels);
        let second = aggregate(&reviews, &labels);

        let render = |r: &ConsensusRanking| serde_json::to_string(&r.entries).unwrap();
        assert_eq!(render(&first), render(&second));
    }

    #[test]
    fn ranking_set_matches_label_map_exactly() {
        let labels = label_map(&["alpha", "bravo", "charlie"]);
        let reviews = vec![review("alpha", &["Response B", "Response C"], 1.0)];

        let ranking = aggregate(&reviews, &labels);
        let mut members: Vec<&str> = ranking.members().map(MemberId::as_str).collect();
        members.sort_unstable();
        assert_eq!(members, ["alpha", "bravo", "charlie"]);
    }
}
