//! Prompt assembly for the three council stages.
//!
//! Stage 2 asks for a strict JSON ballot; Stage 3 asks for labelled
//! sections. Both formats have tolerant parsers on the other side
//! (`reviewer::parse_review`, `synthesizer::parse_synthesis`).

use std::fmt::Write as _;

use crate::aggregator::ConsensusRanking;
use crate::anonymizer::AnonymizedResponse;
use crate::collector::MemberResponse;
use crate::reviewer::ReviewResult;

/// Stage-1 prompt: the bare question with a short framing preamble.
pub fn response_prompt(query: &str) -> String {
    format!(
        "You are one member of a council of independent models. Answer the \
         question below as well as you can. Be direct and complete; your \
         answer will be reviewed anonymously by your peers.\n\n\
         Question:\n{query}"
    )
}

/// Stage-2 prompt: the peers' anonymized answers plus ballot instructions.
///
/// The reviewer's own answer is already excluded by the caller; the labels
/// listed here are exactly the set a valid ballot must rank.
pub fn review_prompt(query: &str, peers: &[AnonymizedResponse]) -> String {
    let mut prompt = format!(
        "You are reviewing anonymized answers from your peer council members. \
         Your own answer is not shown.\n\nQuestion:\n{query}\n"
    );

    for peer in peers {
        let _ = write!(prompt, "\n## {}\n{}\n", peer.label, peer.answer);
    }

    let labels: Vec<&str> = peers.iter().map(|p| p.label.as_str()).collect();
    let _ = write!(
        prompt,
        "\nRank every response above from best to worst. Respond with ONLY a \
         JSON object of this shape:\n\
         {{\"ranking\": [\"<label>\", ...], \"reasoning\": \"<one paragraph>\", \
         \"confidence\": <number between 0.0 and 1.0>}}\n\n\
         The ranking must contain each of {labels:?} exactly once."
    );

    prompt
}

/// Stage-3 prompt: the full de-anonymized council record.
///
/// Which answers and reviews appear is governed by the caller's
/// `include_all_opinions` / `include_peer_reviews` flags. Member identities
/// are real ids here; anonymity has no purpose left by this stage.
pub fn synthesis_prompt(
    query: &str,
    responses: &[MemberResponse],
    ranking: &ConsensusRanking,
    reviews: &[ReviewResult],
    include_all_opinions: bool,
    include_peer_reviews: bool,
) -> String {
    let mut prompt = format!(
        "You are the chairman of a model council. The council has answered \
         the question below and cross-reviewed its own answers. Produce the \
         final answer, weighing the council record.\n\nQuestion:\n{query}\n"
    );

    let _ = write!(prompt, "\n## Consensus ranking\n");
    for (position, entry) in ranking.entries.iter().enumerate() {
        if entry.is_ranked() {
            let _ = write!(
                prompt,
                "{}. {} (score {:.2}, average reviewer confidence {:.2})\n",
                position + 1,
                entry.member,
                entry.score,
                entry.average_confidence
            );
        } else {
            let _ = write!(prompt, "{}. {} (unranked)\n", position + 1, entry.member);
        }
    }

    let _ = write!(prompt, "\n## Council answers\n");
    let top = ranking.top().map(|entry| entry.member.clone());
    for response in responses.iter().filter(|r| r.succeeded) {
        if !include_all_opinions && top.as_ref() != Some(&response.member) {
            continue;
        }
        let _ = write!(prompt, "\n### {}\n{}\n", response.member, response.answer);
    }

    if include_peer_reviews && !reviews.is_empty() {
        let _ = write!(prompt, "\n## Peer reviews\n");
        for review in reviews {
            let _ = write!(
                prompt,
                "\n### Review by {} (confidence {:.2})\n{}\n",
                review.reviewer, review.confidence, review.reasoning
            );
        }
    }

    let _ = write!(
        prompt,
        "\nRespond in exactly this format:\n\
         SYNTHESIS:\n<the final answer>\n\
         REASONING:\n<how you weighed the council>\n\
         CONFIDENCE: <number between 0.0 and 1.0>"
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::RankedMember;
    use crate::member::MemberId;

    fn peers() -> Vec<AnonymizedResponse> {
        vec![
            AnonymizedResponse {
                label: "Response A".to_string(),
                answer: "first answer".to_string(),
            },
            AnonymizedResponse {
                label: "Response B".to_string(),
                answer: "second answer".to_string(),
            },
        ]
    }

    fn ranking() -> ConsensusRanking {
        ConsensusRanking {
            entries: vec![
                RankedMember {
                    member: MemberId::new("alpha"),
                    score: 2.0,
                    average_confidence: 0.9,
                    review_count: 2,
                },
                RankedMember {
                    member: MemberId::new("bravo"),
                    score: 0.0,
                    average_confidence: 0.0,
                    review_count: 0,
                },
            ],
        }
    }

    #[test]
    fn review_prompt_lists_every_peer_label() {
        let prompt = review_prompt("q", &peers());
        assert!(prompt.contains("## Response A"));
        assert!(prompt.contains("## Response B"));
        assert!(prompt.contains("\"ranking\""));
    }

    #[test]
    fn synthesis_prompt_marks_unranked_members() {
        let responses = vec![
            MemberResponse::success(MemberId::new("alpha"), "a"),
            MemberResponse::success(MemberId::new("bravo"), "b"),
        ];
        let prompt = synthesis_prompt("q", &responses, &ranking(), &[], true, true);
        assert!(prompt.contains("1. alpha (score 2.00"));
        assert!(prompt.contains("2. bravo (unranked)"));
    }

    #[test]
    fn opinions_collapse_to_top_ranked_when_flag_is_off() {
        let responses = vec![
            MemberResponse::success(MemberId::new("alpha"), "alpha answer"),
            MemberResponse::success(MemberId::new("bravo"), "bravo answer"),
        ];
        let prompt = synthesis_prompt("q", &responses, &ranking(), &[], false, true);
        assert!(prompt.contains("alpha answer"));
        assert!(!prompt.contains("bravo answer"));
    }

    #[test]
    fn reviews_are_omitted_when_flag_is_off() {
        let reviews = vec![ReviewResult {
            reviewer: MemberId::new("alpha"),
            ranking: vec!["Response B".to_string()],
            reasoning: "solid derivation".to_string(),
            confidence: 0.8,
        }];
        let with = synthesis_prompt("q", &[], &ranking(), &reviews, true, true);
        let without = synthesis_prompt("q", &[], &ranking(), &reviews, true, false);
        assert!(with.contains("solid derivation"));
        assert!(!without.contains("solid derivation"));
    }
}
