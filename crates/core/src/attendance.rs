use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::types::{AttendanceRecord, AttendanceStatus, TeamMember};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttendanceError {
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),
    #[error("range start {from} is after end {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
}

/// Calendar day of `at` in the given IANA timezone.
pub fn local_day(at: DateTime<Utc>, timezone: &str) -> Result<NaiveDate, AttendanceError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| AttendanceError::InvalidTimezone(timezone.to_string()))?;
    Ok(at.with_timezone(&tz).date_naive())
}

/// Calendar month written as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    year: i32,
    month: u32,
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, AttendanceError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(AttendanceError::InvalidMonth(format!("{year}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn containing(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn range(self) -> DateRange {
        DateRange {
            from: self.first_day(),
            to: self.last_day(),
        }
    }
}

impl fmt::Display for MonthPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthPeriod {
    type Err = AttendanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || AttendanceError::InvalidMonth(value.to_string());
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl Serialize for MonthPeriod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, AttendanceError> {
        if from > to {
            return Err(AttendanceError::InvertedRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceCounts {
    pub present: u32,
    pub absent: u32,
    pub half_day: u32,
    pub leave: u32,
    pub marked: u32,
}

impl AttendanceCounts {
    pub fn record(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::HalfDay => self.half_day += 1,
            AttendanceStatus::Leave => self.leave += 1,
        }
        self.marked += 1;
    }

    fn merge(&mut self, other: &AttendanceCounts) {
        self.present += other.present;
        self.absent += other.absent;
        self.half_day += other.half_day;
        self.leave += other.leave;
        self.marked += other.marked;
    }

    /// Share of marked days attended, half days weighted 0.5. Zero when nothing is marked.
    pub fn rate(&self) -> f64 {
        if self.marked == 0 {
            return 0.0;
        }
        let attended = self.present as f64 + 0.5 * self.half_day as f64;
        round2(attended / self.marked as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberAttendance {
    pub member_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub counts: AttendanceCounts,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub range: DateRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    pub members: Vec<MemberAttendance>,
    pub totals: AttendanceCounts,
    pub attendance_rate: f64,
}

/// Keeps one record per member and day, preferring the latest update.
pub fn dedupe_records<'a>(records: &'a [AttendanceRecord]) -> Vec<&'a AttendanceRecord> {
    let mut latest: HashMap<(&str, NaiveDate), &AttendanceRecord> = HashMap::new();
    for record in records {
        latest
            .entry((record.member_id.as_str(), record.date))
            .and_modify(|current| {
                if record.updated_at > current.updated_at {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    let mut unique: Vec<&AttendanceRecord> = latest.into_values().collect();
    unique.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.member_id.cmp(&b.member_id)));
    unique
}

/// Returns whether `record` belongs to `store`, falling back to the member's store.
pub fn record_in_store(
    record: &AttendanceRecord,
    member: Option<&TeamMember>,
    store: &str,
) -> bool {
    let record_store = record
        .store
        .as_deref()
        .or_else(|| member.and_then(|m| m.store.as_deref()));
    record_store
        .map(|value| value.trim().eq_ignore_ascii_case(store.trim()))
        .unwrap_or(false)
}

/// Per-member attendance counts inside `range`, optionally limited to one store.
pub fn summarize_attendance(
    records: &[AttendanceRecord],
    members: &[TeamMember],
    range: DateRange,
    store: Option<&str>,
) -> AttendanceSummary {
    let members_by_id: HashMap<&str, &TeamMember> =
        members.iter().map(|member| (member.id.as_str(), member)).collect();
    let mut per_member: HashMap<&str, AttendanceCounts> = HashMap::new();

    for record in dedupe_records(records) {
        if !range.contains(record.date) {
            continue;
        }
        let member = members_by_id.get(record.member_id.as_str()).copied();
        if let Some(store) = store {
            if !record_in_store(record, member, store) {
                continue;
            }
        }
        per_member
            .entry(record.member_id.as_str())
            .or_default()
            .record(record.status);
    }

    let mut totals = AttendanceCounts::default();
    let mut rows: Vec<MemberAttendance> = per_member
        .into_iter()
        .map(|(member_id, counts)| {
            totals.merge(&counts);
            MemberAttendance {
                member_id: member_id.to_string(),
                name: members_by_id.get(member_id).map(|m| m.name.clone()),
                attendance_rate: counts.rate(),
                counts,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.name
            .as_deref()
            .unwrap_or("")
            .cmp(b.name.as_deref().unwrap_or(""))
            .then_with(|| a.member_id.cmp(&b.member_id))
    });

    AttendanceSummary {
        range,
        store: store.map(str::to_string),
        members: rows,
        attendance_rate: totals.rate(),
        totals,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
