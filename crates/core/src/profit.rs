use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::types::{Candidate, CandidateStage, CandidateStatus, Job};

/// Realized and projected figures for one client, plus report totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientProfit {
    pub client: String,
    pub placements: u32,
    pub revenue: u64,
    pub cost: u64,
    pub profit: i64,
    pub projected_placements: u32,
    pub projected_revenue: u64,
    pub projected_profit: i64,
}

/// Amount owed to a partner agency for the candidates it sourced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VendorPayout {
    pub vendor: String,
    pub placements: u32,
    pub payout: u64,
    pub projected_placements: u32,
    pub projected_payout: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfitReport {
    pub clients: Vec<ClientProfit>,
    pub vendors: Vec<VendorPayout>,
    pub totals: ClientProfit,
}

#[derive(Clone, Copy)]
enum Placement {
    Realized,
    Projected,
}

fn margin(revenue: u64, cost: u64) -> i64 {
    let diff = i128::from(revenue) - i128::from(cost);
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

fn classify(candidate: &Candidate) -> Option<Placement> {
    if candidate.status == CandidateStatus::Quit {
        return None;
    }
    match candidate.stage {
        CandidateStage::Selected => Some(Placement::Realized),
        CandidateStage::Interview => Some(Placement::Projected),
        _ => None,
    }
}

/// Projects revenue, vendor cost and profit from the candidate pipeline.
///
/// Selected candidates count as placements billed at the job's client rate;
/// interviewing candidates feed the projected columns. Partner-sourced
/// candidates cost the job's vendor rate; internal ones cost nothing.
/// Candidates without a known job are ignored.
pub fn profit_projection(candidates: &[Candidate], jobs: &[Job]) -> ProfitReport {
    let jobs_by_id: HashMap<&str, &Job> = jobs.iter().map(|job| (job.id.as_str(), job)).collect();
    let mut clients: BTreeMap<String, ClientProfit> = BTreeMap::new();
    let mut vendors: BTreeMap<String, VendorPayout> = BTreeMap::new();

    for candidate in candidates {
        let Some(placement) = classify(candidate) else {
            continue;
        };
        let Some(job) = candidate
            .job_id
            .as_deref()
            .and_then(|id| jobs_by_id.get(id).copied())
        else {
            continue;
        };

        let partner = candidate.partner();
        let cost = if partner.is_some() { job.vendor_rate } else { 0 };
        let client = clients
            .entry(job.client.trim().to_string())
            .or_insert_with(|| ClientProfit {
                client: job.client.trim().to_string(),
                ..ClientProfit::default()
            });

        match placement {
            Placement::Realized => {
                client.placements += 1;
                client.revenue = client.revenue.saturating_add(job.client_rate);
                client.cost = client.cost.saturating_add(cost);
            }
            Placement::Projected => {
                client.projected_placements += 1;
                client.projected_revenue = client.projected_revenue.saturating_add(job.client_rate);
                client.projected_profit = client
                    .projected_profit
                    .saturating_add(margin(job.client_rate, cost));
            }
        }

        if let Some(partner) = partner {
            let vendor = vendors
                .entry(partner.to_string())
                .or_insert_with(|| VendorPayout {
                    vendor: partner.to_string(),
                    ..VendorPayout::default()
                });
            match placement {
                Placement::Realized => {
                    vendor.placements += 1;
                    vendor.payout = vendor.payout.saturating_add(job.vendor_rate);
                }
                Placement::Projected => {
                    vendor.projected_placements += 1;
                    vendor.projected_payout = vendor.projected_payout.saturating_add(job.vendor_rate);
                }
            }
        }
    }

    let mut totals = ClientProfit {
        client: "total".to_string(),
        ..ClientProfit::default()
    };
    let clients: Vec<ClientProfit> = clients
        .into_values()
        .map(|mut line| {
            line.profit = margin(line.revenue, line.cost);
            totals.placements += line.placements;
            totals.revenue = totals.revenue.saturating_add(line.revenue);
            totals.cost = totals.cost.saturating_add(line.cost);
            totals.profit = totals.profit.saturating_add(line.profit);
            totals.projected_placements += line.projected_placements;
            totals.projected_revenue = totals.projected_revenue.saturating_add(line.projected_revenue);
            totals.projected_profit = totals.projected_profit.saturating_add(line.projected_profit);
            line
        })
        .collect();

    ProfitReport {
        clients,
        vendors: vendors.into_values().collect(),
        totals,
    }
}
