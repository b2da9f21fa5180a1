//! Capability-based candidate ranking.

use std::collections::BTreeSet;

use crate::registry::AgentRecord;

/// Order `candidates` by how well they cover `required`.
///
/// Agents are ranked by the number of required capabilities they declare,
/// then by the ratio of satisfied to required, both descending. The sort is
/// stable, so ties keep their incoming order.
pub fn rank_candidates(
    candidates: Vec<AgentRecord>,
    required: &BTreeSet<String>,
) -> Vec<AgentRecord> {
    if candidates.len() <= 1 || required.is_empty() {
        return candidates;
    }

    let total = required.len() as f64;
    let mut scored: Vec<(usize, f64, AgentRecord)> = candidates
        .into_iter()
        .map(|agent| {
            let count = required.iter().filter(|cap| agent.has_capability(cap)).count();
            (count, count as f64 / total, agent)
        })
        .collect();

    scored.sort_by(|(count_a, ratio_a, _), (count_b, ratio_b, _)| {
        count_b.cmp(count_a).then_with(|| ratio_b.total_cmp(ratio_a))
    });

    scored.into_iter().map(|(_, _, agent)| agent).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Capability;

    fn agent(id: &str, caps: &[&str]) -> AgentRecord {
        caps.iter()
            .fold(AgentRecord::new(id, id), |a, c| a.with_capability(Capability::new(*c, "")))
    }

    #[test]
    fn better_coverage_ranks_first() {
        let required: BTreeSet<String> = ["research", "planning"].iter().map(|s| s.to_string()).collect();
        let ranked = rank_candidates(
            vec![
                agent("one", &["research"]),
                agent("both", &["research", "planning"]),
                agent("other", &["planning"]),
            ],
            &required,
        );
        let ids: Vec<_> = ranked.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["both", "one", "other"]);
    }

    #[test]
    fn single_candidate_is_untouched() {
        let required = BTreeSet::from(["x".to_string()]);
        let ranked = rank_candidates(vec![agent("solo", &[])], &required);
        assert_eq!(ranked.len(), 1);
    }
}
