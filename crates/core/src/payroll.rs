use std::collections::HashMap;

use serde::Serialize;

use crate::attendance::{dedupe_records, round2, AttendanceCounts, MonthPeriod};
use crate::types::{AttendanceRecord, Role, Settings, TeamMember};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollLine {
    pub member_id: String,
    pub name: String,
    pub role: Role,
    pub monthly_salary: u64,
    pub attendance: AttendanceCounts,
    pub paid_leaves: u32,
    pub payable_days: f64,
    pub gross_pay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayrollReport {
    pub month: MonthPeriod,
    pub working_days: u32,
    pub lines: Vec<PayrollLine>,
    pub total_gross: f64,
}

/// Prorates monthly salaries by attendance for active internal staff.
///
/// Payable days are present days plus half days at 0.5 plus leave up to the
/// paid allowance, capped at the configured working days.
pub fn compute_payroll(
    members: &[TeamMember],
    records: &[AttendanceRecord],
    settings: &Settings,
    month: MonthPeriod,
) -> PayrollReport {
    let range = month.range();
    let working_days = settings.working_days_per_month.max(1);

    let mut counts: HashMap<&str, AttendanceCounts> = HashMap::new();
    for record in dedupe_records(records) {
        if range.contains(record.date) {
            counts
                .entry(record.member_id.as_str())
                .or_default()
                .record(record.status);
        }
    }

    let mut lines: Vec<PayrollLine> = members
        .iter()
        .filter(|member| member.active && member.role.is_internal() && member.monthly_salary > 0)
        .map(|member| {
            let attendance = counts.get(member.id.as_str()).copied().unwrap_or_default();
            let paid_leaves = attendance.leave.min(settings.paid_leaves_per_month);
            let payable_days = (attendance.present as f64
                + 0.5 * attendance.half_day as f64
                + paid_leaves as f64)
                .min(working_days as f64);
            let gross_pay =
                round2(member.monthly_salary as f64 * payable_days / working_days as f64);
            PayrollLine {
                member_id: member.id.clone(),
                name: member.name.clone(),
                role: member.role,
                monthly_salary: member.monthly_salary,
                attendance,
                paid_leaves,
                payable_days,
                gross_pay,
            }
        })
        .collect();
    lines.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.member_id.cmp(&b.member_id)));

    let total_gross = round2(lines.iter().map(|line| line.gross_pay).sum());
    PayrollReport {
        month,
        working_days,
        lines,
        total_gross,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::fixtures::{day, member, record};
    use crate::types::AttendanceStatus;

    #[test]
    fn prorates_salary_by_payable_days() {
        let members = vec![
            member("m1", "Anil", None, 26_000),
            member("m2", "Bina", None, 0),
        ];
        let records = vec![
            record("r1", "m1", day(2), AttendanceStatus::Present),
            record("r2", "m1", day(3), AttendanceStatus::Present),
            record("r3", "m1", day(4), AttendanceStatus::HalfDay),
            record("r4", "m1", day(5), AttendanceStatus::Leave),
            record("r5", "m1", day(6), AttendanceStatus::Leave),
            record("r6", "m1", day(7), AttendanceStatus::Absent),
        ];
        let settings = Settings::default();
        let month: MonthPeriod = "2026-03".parse().unwrap();

        let report = compute_payroll(&members, &records, &settings, month);
        assert_eq!(report.lines.len(), 1);
        let line = &report.lines[0];
        assert_eq!(line.paid_leaves, 1);
        assert_eq!(line.payable_days, 3.5);
        assert_eq!(line.gross_pay, 3_500.0);
        assert_eq!(report.total_gross, 3_500.0);
        assert_eq!(report.working_days, 26);
    }

    #[test]
    fn payable_days_cap_at_working_days() {
        let members = vec![member("m1", "Anil", None, 10_000)];
        let records: Vec<AttendanceRecord> = (1..=31)
            .map(|d| record(&format!("r{d}"), "m1", day(d), AttendanceStatus::Present))
            .collect();
        let settings = Settings::default();
        let report = compute_payroll(&members, &records, &settings, "2026-03".parse().unwrap());
        assert_eq!(report.lines[0].payable_days, 26.0);
        assert_eq!(report.lines[0].gross_pay, 10_000.0);
    }
}
