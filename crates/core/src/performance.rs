use std::collections::HashMap;

use serde::Serialize;

use crate::hierarchy::TeamNode;
use crate::pipeline::StageCounts;
use crate::types::{Candidate, Role};

/// Team tree node annotated with recruiting results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceNode {
    pub id: String,
    pub name: String,
    pub role: Role,
    /// Candidates this member recruited personally.
    pub own: StageCounts,
    /// Candidates recruited by this member and everyone below them.
    pub team: StageCounts,
    pub reports: Vec<PerformanceNode>,
}

/// Attaches per-recruiter stage counts to every node of a reporting forest.
pub fn team_performance(forest: &[TeamNode], candidates: &[Candidate]) -> Vec<PerformanceNode> {
    let by_recruiter = counts_by_recruiter(candidates);
    forest
        .iter()
        .map(|node| annotate(node, &by_recruiter))
        .collect()
}

fn counts_by_recruiter(candidates: &[Candidate]) -> HashMap<&str, StageCounts> {
    let mut counts: HashMap<&str, StageCounts> = HashMap::new();
    for candidate in candidates {
        let Some(recruiter) = candidate.recruiter.as_deref().map(str::trim) else {
            continue;
        };
        if recruiter.is_empty() {
            continue;
        }
        counts.entry(recruiter).or_default().record(candidate.stage);
    }
    counts
}

fn annotate(node: &TeamNode, by_recruiter: &HashMap<&str, StageCounts>) -> PerformanceNode {
    let own = by_recruiter
        .get(node.name.trim())
        .copied()
        .unwrap_or_default();
    let reports: Vec<PerformanceNode> = node
        .reports
        .iter()
        .map(|child| annotate(child, by_recruiter))
        .collect();

    let mut team = own;
    for child in &reports {
        team.merge(&child.team);
    }

    PerformanceNode {
        id: node.id.clone(),
        name: node.name.clone(),
        role: node.role,
        own,
        team,
        reports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::candidate;
    use crate::types::{CandidateStage, CandidateStatus};

    fn node(id: &str, name: &str, reports: Vec<TeamNode>) -> TeamNode {
        TeamNode {
            id: id.to_string(),
            name: name.to_string(),
            role: Role::Team,
            reports,
        }
    }

    fn recruited(id: &str, stage: CandidateStage, recruiter: &str) -> Candidate {
        let mut c = candidate(id, id, stage, CandidateStatus::Active);
        c.recruiter = Some(recruiter.to_string());
        c
    }

    #[test]
    fn team_totals_roll_up_the_chain() {
        let forest = vec![node(
            "1",
            "Priya",
            vec![node("2", "Arjun", vec![node("3", "Kiran", Vec::new())])],
        )];
        let candidates = vec![
            recruited("c1", CandidateStage::Selected, "Priya"),
            recruited("c2", CandidateStage::Interview, "Arjun"),
            recruited("c3", CandidateStage::Selected, "Kiran"),
            recruited("c4", CandidateStage::Sourced, " Kiran "),
            recruited("c5", CandidateStage::Sourced, "Someone Else"),
        ];

        let performance = team_performance(&forest, &candidates);
        let priya = &performance[0];
        assert_eq!(priya.own.total, 1);
        assert_eq!(priya.team.total, 4);
        assert_eq!(priya.team.selected, 2);

        let arjun = &priya.reports[0];
        assert_eq!(arjun.own.interview, 1);
        assert_eq!(arjun.team.total, 3);

        let kiran = &arjun.reports[0];
        assert_eq!(kiran.own, kiran.team);
        assert_eq!(kiran.own.sourced, 1);
    }
}
