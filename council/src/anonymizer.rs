//! Identity anonymizer: opaque labels over successful responses.
//!
//! Stage 2 reviewers see `Response A`, `Response B`, ... instead of member
//! identities. The reverse mapping never leaves this module's [`LabelMap`],
//! which is session-scoped; a fresh map per session means labels can never
//! leak review context across sessions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::collector::MemberResponse;
use crate::member::MemberId;

/// One member answer under its session-scoped label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizedResponse {
    pub label: String,
    pub answer: String,
}

/// Private bijection between labels and member identities.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    forward: HashMap<MemberId, String>,
    reverse: HashMap<String, MemberId>,
}

impl LabelMap {
    fn insert(&mut self, member: MemberId, label: String) {
        self.forward.insert(member.clone(), label.clone());
        self.reverse.insert(label, member);
    }

    pub fn label_for(&self, member: &MemberId) -> Option<&str> {
        self.forward.get(member).map(String::as_str)
    }

    pub fn member_for(&self, label: &str) -> Option<&MemberId> {
        self.reverse.get(label)
    }

    /// Iterate the (member, label) pairs. Order is unspecified.
    pub fn members(&self) -> impl Iterator<Item = (&MemberId, &str)> {
        self.forward.iter().map(|(m, l)| (m, l.as_str()))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Assign labels to the successful subset of stage-one responses.
///
/// Label order follows input order, so identical response sets reproduce
/// identical labels. With anonymization disabled the member id doubles as
/// the label and the map degenerates to the identity mapping, keeping
/// Stage 2 uniform either way.
pub fn anonymize(
    responses: &[MemberResponse],
    enabled: bool,
) -> (Vec<AnonymizedResponse>, LabelMap) {
    let mut anonymized = Vec::new();
    let mut map = LabelMap::default();

    for response in responses.iter().filter(|r| r.succeeded) {
        let label = if enabled {
            alpha_label(map.len())
        } else {
            response.member.as_str().to_string()
        };
        map.insert(response.member.clone(), label.clone());
        anonymized.push(AnonymizedResponse {
            label,
            answer: response.answer.clone(),
        });
    }

    (anonymized, map)
}

/// Spreadsheet-style letter sequence: A..Z, then AA, AB, ...
fn alpha_label(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = String::new();
    while n > 0 {
        n -= 1;
        letters.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    format!("Response {letters}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(ids: &[&str]) -> Vec<MemberResponse> {
        ids.iter()
            .map(|id| MemberResponse::success(MemberId::new(*id), format!("answer from {id}")))
            .collect()
    }

    #[test]
    fn labels_follow_input_order() {
        let (anonymized, _) = anonymize(&responses(&["charlie", "alpha", "bravo"]), true);
        let labels: Vec<&str> = anonymized.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, ["Response A", "Response B", "Response C"]);
    }

    #[test]
    fn mapping_is_a_bijection_over_successes() {
        let mut input = responses(&["alpha", "bravo"]);
        input.push(MemberResponse::failure(
            MemberId::new("charlie"),
            "timed out",
        ));

        let (anonymized, map) = anonymize(&input, true);
        assert_eq!(anonymized.len(), 2);
        assert_eq!(map.len(), 2);
        for entry in &anonymized {
            let member = map.member_for(&entry.label).unwrap();
            assert_eq!(map.label_for(member), Some(entry.label.as_str()));
        }
        assert!(map.label_for(&MemberId::new("charlie")).is_none());
    }

    #[test]
    fn passthrough_uses_member_ids_as_labels() {
        let (anonymized, map) = anonymize(&responses(&["alpha", "bravo"]), false);
        assert_eq!(anonymized[0].label, "alpha");
        assert_eq!(
            map.member_for("bravo"),
            Some(&MemberId::new("bravo"))
        );
    }

    #[test]
    fn labels_extend_past_twenty_six() {
        assert_eq!(alpha_label(0), "Response A");
        assert_eq!(alpha_label(25), "Response Z");
        assert_eq!(alpha_label(26), "Response AA");
        assert_eq!(alpha_label(27), "Response AB");
        assert_eq!(alpha_label(52), "Response BA");
    }

    #[test]
    fn two_runs_over_the_same_set_agree() {
        let input = responses(&["alpha", "bravo", "charlie"]);
        let (first, _) = anonymize(&input, true);
        let (second, _) = anonymize(&input, true);
        let a: Vec<_> = first.iter().map(|r| (&r.label, &r.answer)).collect();
        let b: Vec<_> = second.iter().map(|r| (&r.label, &r.answer)).collect();
        assert_eq!(a, b);
    }
}
