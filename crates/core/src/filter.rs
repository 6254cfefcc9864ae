use std::cmp::Ordering;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::types::{Candidate, CandidateStage, CandidateStatus};

/// Source filter value that selects internally sourced candidates.
pub const INTERNAL_SOURCE: &str = "internal";

/// Table filters applied to the candidate list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CandidateFilter {
    pub stage: Option<CandidateStage>,
    pub status: Option<CandidateStatus>,
    pub job_id: Option<String>,
    pub source: Option<String>,
    pub recruiter: Option<String>,
    pub store: Option<String>,
    /// Case-insensitive match against name, phone and email.
    pub q: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub sort: Option<CandidateSort>,
}

impl CandidateFilter {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if self.stage.is_some_and(|stage| stage != candidate.stage) {
            return false;
        }
        if self.status.is_some_and(|status| status != candidate.status) {
            return false;
        }
        if let Some(job_id) = non_blank(&self.job_id) {
            if candidate.job_id.as_deref() != Some(job_id) {
                return false;
            }
        }
        if let Some(source) = non_blank(&self.source) {
            let matched = match candidate.partner() {
                Some(partner) => partner.eq_ignore_ascii_case(source),
                None => source.eq_ignore_ascii_case(INTERNAL_SOURCE),
            };
            if !matched {
                return false;
            }
        }
        if let Some(recruiter) = non_blank(&self.recruiter) {
            if !same_text(candidate.recruiter.as_deref(), recruiter) {
                return false;
            }
        }
        if let Some(store) = non_blank(&self.store) {
            if !same_text(candidate.store.as_deref(), store) {
                return false;
            }
        }
        if let Some(query) = non_blank(&self.q) {
            let needle = query.to_lowercase();
            let haystack = [
                Some(candidate.name.as_str()),
                candidate.phone.as_deref(),
                candidate.email.as_deref(),
            ];
            if !haystack
                .iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        let created = candidate.created_at.date_naive();
        if self.created_from.is_some_and(|from| created < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| created > to) {
            return false;
        }
        true
    }

    /// Filters then sorts; without an explicit sort the newest candidates come first.
    pub fn apply(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut rows: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| self.matches(candidate))
            .collect();
        let sort = self.sort.unwrap_or(CandidateSort {
            key: SortKey::CreatedAt,
            descending: true,
        });
        rows.sort_by(|a, b| sort.compare(a, b));
        rows
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn same_text(value: Option<&str>, expected: &str) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    CreatedAt,
    UpdatedAt,
}

/// Sort order written as `name`, `created_at`, `updated_at`, `-` prefix for descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSort {
    pub key: SortKey,
    pub descending: bool,
}

impl CandidateSort {
    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        let ordering = match self.key {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        let ordering = if self.descending {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

impl FromStr for CandidateSort {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (descending, field) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };
        let key = match field {
            "name" => SortKey::Name,
            "created_at" => SortKey::CreatedAt,
            "updated_at" => SortKey::UpdatedAt,
            other => return Err(format!("unknown sort field '{other}'")),
        };
        Ok(Self { key, descending })
    }
}

impl<'de> Deserialize<'de> for CandidateSort {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
