//! Role specific dashboards assembled from a full snapshot of the collections.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::attendance::{summarize_attendance, AttendanceSummary, DateRange, MonthPeriod};
use crate::hierarchy::{find_subtree, team_tree};
use crate::payroll::{compute_payroll, PayrollReport};
use crate::performance::{team_performance, PerformanceNode};
use crate::pipeline::{pipeline_summary, PipelineSummary};
use crate::profit::{profit_projection, ProfitReport};
use crate::types::{
    AttendanceRecord, Candidate, CandidateStage, CandidateStatus, Complaint, ComplaintStatus, Job,
    JobStatus, Requirement, RequirementStatus, Settings, TeamMember,
};

/// Every collection loaded at once; dashboards are pure functions of it.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub jobs: Vec<Job>,
    pub candidates: Vec<Candidate>,
    pub members: Vec<TeamMember>,
    pub complaints: Vec<Complaint>,
    pub requirements: Vec<Requirement>,
    pub attendance: Vec<AttendanceRecord>,
    pub settings: Settings,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DashboardError {
    #[error("no team lead named '{0}'")]
    UnknownTeamLead(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComplaintSummary {
    pub open: u32,
    pub in_progress: u32,
    pub resolved: u32,
    pub total: u32,
}

pub fn complaint_summary(complaints: &[Complaint]) -> ComplaintSummary {
    let mut summary = ComplaintSummary::default();
    for complaint in complaints {
        match complaint.status {
            ComplaintStatus::Open => summary.open += 1,
            ComplaintStatus::InProgress => summary.in_progress += 1,
            ComplaintStatus::Resolved => summary.resolved += 1,
        }
        summary.total += 1;
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminDashboard {
    pub pipeline: PipelineSummary,
    pub profit: ProfitReport,
    pub team: Vec<PerformanceNode>,
    pub open_jobs: usize,
    pub pending_requirements: usize,
    pub open_complaints: usize,
}

pub fn admin_dashboard(data: &Dataset) -> AdminDashboard {
    let forest = team_tree(&data.members);
    AdminDashboard {
        pipeline: pipeline_summary(&data.candidates),
        profit: profit_projection(&data.candidates, &data.jobs),
        team: team_performance(&forest, &data.candidates),
        open_jobs: data
            .jobs
            .iter()
            .filter(|job| job.status == JobStatus::Open)
            .count(),
        pending_requirements: data
            .requirements
            .iter()
            .filter(|req| req.status == RequirementStatus::Pending)
            .count(),
        open_complaints: data
            .complaints
            .iter()
            .filter(|complaint| complaint.status != ComplaintStatus::Resolved)
            .count(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HrDashboard {
    pub month: MonthPeriod,
    pub attendance: AttendanceSummary,
    pub payroll: PayrollReport,
    pub complaints: ComplaintSummary,
    pub open_complaints: Vec<Complaint>,
}

pub fn hr_dashboard(data: &Dataset, month: MonthPeriod) -> HrDashboard {
    let mut open_complaints: Vec<Complaint> = data
        .complaints
        .iter()
        .filter(|complaint| complaint.status != ComplaintStatus::Resolved)
        .cloned()
        .collect();
    open_complaints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    HrDashboard {
        month,
        attendance: summarize_attendance(&data.attendance, &data.members, month.range(), None),
        payroll: compute_payroll(&data.members, &data.attendance, &data.settings, month),
        complaints: complaint_summary(&data.complaints),
        open_complaints,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamLeadDashboard {
    pub lead: String,
    pub team: PerformanceNode,
    pub pipeline: PipelineSummary,
    pub team_size: usize,
}

pub fn team_lead_dashboard(data: &Dataset, lead: &str) -> Result<TeamLeadDashboard, DashboardError> {
    let forest = team_tree(&data.members);
    let subtree = find_subtree(&forest, lead)
        .ok_or_else(|| DashboardError::UnknownTeamLead(lead.to_string()))?;
    let names: HashSet<&str> = subtree.names().into_iter().map(str::trim).collect();

    let team_candidates: Vec<&Candidate> = data
        .candidates
        .iter()
        .filter(|candidate| {
            candidate
                .recruiter
                .as_deref()
                .map(|recruiter| names.contains(recruiter.trim()))
                .unwrap_or(false)
        })
        .collect();

    let team = team_performance(std::slice::from_ref(subtree), &data.candidates)
        .pop()
        .ok_or_else(|| DashboardError::UnknownTeamLead(lead.to_string()))?;

    Ok(TeamLeadDashboard {
        lead: subtree.name.clone(),
        pipeline: pipeline_summary(team_candidates),
        team_size: subtree.size(),
        team,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartnerCandidateRow {
    pub id: String,
    pub name: String,
    pub stage: CandidateStage,
    pub status: CandidateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartnerDashboard {
    pub partner: String,
    pub pipeline: PipelineSummary,
    pub candidates: Vec<PartnerCandidateRow>,
    pub requirements: Vec<Requirement>,
}

pub fn partner_dashboard(data: &Dataset, partner: &str) -> PartnerDashboard {
    let partner = partner.trim();
    let jobs: HashMap<&str, &Job> = data.jobs.iter().map(|job| (job.id.as_str(), job)).collect();

    let sourced: Vec<&Candidate> = data
        .candidates
        .iter()
        .filter(|candidate| {
            candidate
                .partner()
                .map(|name| name.eq_ignore_ascii_case(partner))
                .unwrap_or(false)
        })
        .collect();

    let mut rows: Vec<PartnerCandidateRow> = sourced
        .iter()
        .map(|candidate| PartnerCandidateRow {
            id: candidate.id.clone(),
            name: candidate.name.clone(),
            stage: candidate.stage,
            status: candidate.status,
            job_title: candidate
                .job_id
                .as_deref()
                .and_then(|id| jobs.get(id))
                .map(|job| job.title.clone()),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let mut requirements: Vec<Requirement> = data
        .requirements
        .iter()
        .filter(|req| req.partner.trim().eq_ignore_ascii_case(partner))
        .cloned()
        .collect();
    requirements.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    PartnerDashboard {
        partner: partner.to_string(),
        pipeline: pipeline_summary(sourced),
        candidates: rows,
        requirements,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorDashboard {
    pub store: String,
    pub date: NaiveDate,
    pub attendance: AttendanceSummary,
    /// Store members with no attendance record for the day, at any store.
    pub unmarked: Vec<String>,
}

pub fn supervisor_dashboard(data: &Dataset, store: &str, date: NaiveDate) -> SupervisorDashboard {
    let store = store.trim();
    let summary = summarize_attendance(&data.attendance, &data.members, DateRange::day(date), Some(store));

    let marked: HashSet<&str> = data
        .attendance
        .iter()
        .filter(|record| record.date == date)
        .map(|record| record.member_id.as_str())
        .collect();

    let mut unmarked: Vec<String> = data
        .members
        .iter()
        .filter(|member| member.active)
        .filter(|member| {
            member
                .store
                .as_deref()
                .map(|value| value.trim().eq_ignore_ascii_case(store))
                .unwrap_or(false)
        })
        .filter(|member| !marked.contains(member.id.as_str()))
        .map(|member| member.name.clone())
        .collect();
    unmarked.sort();

    SupervisorDashboard {
        store: store.to_string(),
        date,
        attendance: summary,
        unmarked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::fixtures::{day, member, record};
    use crate::pipeline::fixtures::candidate;
    use crate::types::{AttendanceStatus, Role};
    use chrono::{TimeZone, Utc};

    fn dataset() -> Dataset {
        let mut lead = member("m1", "Priya", Some("Koramangala"), 40_000);
        lead.role = Role::TeamLead;
        let mut recruiter = member("m2", "Arjun", Some("Koramangala"), 20_000);
        recruiter.reporting_manager = Some("Priya".to_string());
        let other = member("m3", "Dev", Some("Indiranagar"), 20_000);

        let mut c1 = candidate("c1", "Ravi", CandidateStage::Selected, CandidateStatus::Selected);
        c1.recruiter = Some("Arjun".to_string());
        c1.source = Some("Acme".to_string());
        c1.job_id = Some("j1".to_string());
        let mut c2 = candidate("c2", "Anu", CandidateStage::Interview, CandidateStatus::Active);
        c2.recruiter = Some("Dev".to_string());
        let mut c3 = candidate("c3", "Bhavna", CandidateStage::Sourced, CandidateStatus::Active);
        c3.recruiter = Some("Priya".to_string());
        c3.source = Some("acme".to_string());

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let requirement: Requirement = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "partner": "Acme",
            "title": "Picker",
            "created_at": at,
            "updated_at": at,
        }))
        .unwrap();
        let complaint: Complaint = serde_json::from_value(serde_json::json!({
            "id": "k1",
            "raised_by": "Arjun",
            "subject": "Shift swap",
            "created_at": at,
            "updated_at": at,
        }))
        .unwrap();
        let job: Job = serde_json::from_value(serde_json::json!({
            "id": "j1",
            "title": "Cashier",
            "client": "MegaMart",
            "client_rate": 9000,
            "vendor_rate": 3000,
            "created_at": at,
            "updated_at": at,
        }))
        .unwrap();

        Dataset {
            jobs: vec![job],
            candidates: vec![c1, c2, c3],
            members: vec![lead, recruiter, other],
            complaints: vec![complaint],
            requirements: vec![requirement],
            attendance: vec![
                record("a1", "m1", day(2), AttendanceStatus::Present),
                record("a2", "m3", day(2), AttendanceStatus::Present),
            ],
            settings: Settings::default(),
        }
    }

    #[test]
    fn admin_dashboard_aggregates_everything() {
        let dashboard = admin_dashboard(&dataset());
        assert_eq!(dashboard.pipeline.total, 3);
        assert_eq!(dashboard.profit.totals.profit, 6_000);
        assert_eq!(dashboard.team.len(), 2);
        assert_eq!(dashboard.open_jobs, 1);
        assert_eq!(dashboard.pending_requirements, 1);
        assert_eq!(dashboard.open_complaints, 1);
    }

    #[test]
    fn team_lead_dashboard_covers_subtree() {
        let dashboard = team_lead_dashboard(&dataset(), "Priya").unwrap();
        assert_eq!(dashboard.team_size, 2);
        assert_eq!(dashboard.pipeline.total, 2);
        assert_eq!(dashboard.team.team.total, 2);
        assert_eq!(
            team_lead_dashboard(&dataset(), "Nobody").unwrap_err(),
            DashboardError::UnknownTeamLead("Nobody".to_string())
        );
    }

    #[test]
    fn partner_dashboard_matches_partner_case_insensitively() {
        let dashboard = partner_dashboard(&dataset(), "ACME");
        assert_eq!(dashboard.pipeline.total, 2);
        assert_eq!(dashboard.candidates[0].name, "Bhavna");
        assert_eq!(dashboard.candidates[1].job_title.as_deref(), Some("Cashier"));
        assert_eq!(dashboard.requirements.len(), 1);
    }

    #[test]
    fn supervisor_dashboard_lists_unmarked_store_members() {
        let dashboard = supervisor_dashboard(&dataset(), "Koramangala", day(2));
        assert_eq!(dashboard.attendance.members.len(), 1);
        assert_eq!(dashboard.unmarked, vec!["Arjun".to_string()]);
    }

    #[test]
    fn member_marked_at_another_store_is_not_unmarked() {
        let mut data = dataset();
        let mut elsewhere = record("a3", "m2", day(2), AttendanceStatus::Present);
        elsewhere.store = Some("Indiranagar".to_string());
        data.attendance.push(elsewhere);

        let dashboard = supervisor_dashboard(&data, "Koramangala", day(2));
        assert!(dashboard.unmarked.is_empty());
        assert_eq!(dashboard.attendance.members.len(), 1);

        let next_day = supervisor_dashboard(&data, "Koramangala", day(3));
        assert_eq!(next_day.unmarked, vec!["Arjun".to_string(), "Priya".to_string()]);
    }

    #[test]
    fn hr_dashboard_uses_month_range() {
        let dashboard = hr_dashboard(&dataset(), "2026-03".parse().unwrap());
        assert_eq!(dashboard.attendance.totals.present, 2);
        assert_eq!(dashboard.payroll.lines.len(), 3);
        assert_eq!(dashboard.complaints.open, 1);
        assert_eq!(dashboard.open_complaints.len(), 1);
    }
}
