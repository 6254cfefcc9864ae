use serde::Serialize;

use crate::types::{Candidate, CandidateStage, CandidateStatus};

/// Candidate counts per pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub sourced: u32,
    pub on_the_way: u32,
    pub interview: u32,
    pub selected: u32,
    pub total: u32,
}

impl StageCounts {
    pub fn record(&mut self, stage: CandidateStage) {
        match stage {
            CandidateStage::Sourced => self.sourced += 1,
            CandidateStage::OnTheWay => self.on_the_way += 1,
            CandidateStage::Interview => self.interview += 1,
            CandidateStage::Selected => self.selected += 1,
        }
        self.total += 1;
    }

    pub fn merge(&mut self, other: &StageCounts) {
        self.sourced += other.sourced;
        self.on_the_way += other.on_the_way;
        self.interview += other.interview;
        self.selected += other.selected;
        self.total += other.total;
    }

    pub fn get(&self, stage: CandidateStage) -> u32 {
        match stage {
            CandidateStage::Sourced => self.sourced,
            CandidateStage::OnTheWay => self.on_the_way,
            CandidateStage::Interview => self.interview,
            CandidateStage::Selected => self.selected,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: u32,
    pub quit: u32,
    pub selected: u32,
    pub pending: u32,
}

impl StatusCounts {
    pub fn record(&mut self, status: CandidateStatus) {
        match status {
            CandidateStatus::Active => self.active += 1,
            CandidateStatus::Quit => self.quit += 1,
            CandidateStatus::Selected => self.selected += 1,
            CandidateStatus::Pending => self.pending += 1,
        }
    }
}

/// Stage and status totals for a set of candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub stages: StageCounts,
    pub statuses: StatusCounts,
    pub total: u32,
}

pub fn pipeline_summary<'a, I>(candidates: I) -> PipelineSummary
where
    I: IntoIterator<Item = &'a Candidate>,
{
    let mut summary = PipelineSummary::default();
    for candidate in candidates {
        summary.stages.record(candidate.stage);
        summary.statuses.record(candidate.status);
        summary.total += 1;
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KanbanColumn {
    pub stage: CandidateStage,
    pub label: &'static str,
    pub count: usize,
    pub candidates: Vec<Candidate>,
}

/// Groups candidates into one column per stage, newest first inside a column.
pub fn kanban_board(candidates: &[Candidate]) -> Vec<KanbanColumn> {
    CandidateStage::ALL
        .into_iter()
        .map(|stage| {
            let mut column: Vec<Candidate> = candidates
                .iter()
                .filter(|candidate| candidate.stage == stage)
                .cloned()
                .collect();
            column.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
            KanbanColumn {
                stage,
                label: stage.label(),
                count: column.len(),
                candidates: column,
            }
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::{base_time, candidate};
    use super::*;
    use chrono::Duration;

    #[test]
    fn summary_counts_stages_and_statuses() {
        let candidates = vec![
            candidate("1", "A", CandidateStage::Sourced, CandidateStatus::Active),
            candidate("2", "B", CandidateStage::Interview, CandidateStatus::Pending),
            candidate("3", "C", CandidateStage::Selected, CandidateStatus::Selected),
            candidate("4", "D", CandidateStage::Interview, CandidateStatus::Quit),
        ];
        let summary = pipeline_summary(&candidates);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.stages.interview, 2);
        assert_eq!(summary.stages.get(CandidateStage::Selected), 1);
        assert_eq!(summary.stages.on_the_way, 0);
        assert_eq!(summary.statuses.quit, 1);
        assert_eq!(summary.statuses.pending, 1);
    }

    #[test]
    fn kanban_orders_columns_by_stage_and_newest_first() {
        let mut older = candidate("a", "Old", CandidateStage::OnTheWay, CandidateStatus::Active);
        older.created_at = base_time();
        let mut newer = candidate("b", "New", CandidateStage::OnTheWay, CandidateStatus::Active);
        newer.created_at = base_time() + Duration::hours(2);

        let board = kanban_board(&[older, newer]);
        assert_eq!(board.len(), 4);
        assert_eq!(board[0].stage, CandidateStage::Sourced);
        assert_eq!(board[0].count, 0);
        assert_eq!(board[1].label, "On the way");
        let ids: Vec<&str> = board[1].candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn merged_counts_add_up() {
        let mut left = StageCounts::default();
        left.record(CandidateStage::Sourced);
        let mut right = StageCounts::default();
        right.record(CandidateStage::Selected);
        right.record(CandidateStage::Selected);
        left.merge(&right);
        assert_eq!(left.total, 3);
        assert_eq!(left.selected, 2);
    }
}
