// 🚩 Signals - Priority score for clusters, financial outliers for facilities
//
// score = facilities × (1 + shared_types × weight) × revenue_factor × income_factor
//
// A high score or an alert means "look here first". These are ranking
// signals for a human reviewer, never verdicts.

use crate::clustering::Cluster;
use crate::config::{AnomalyThresholds, SignalWeights};
use crate::financial::{FinancialJoin, FinancialSummary};
use crate::grouping::AttributeType;
use crate::records::{Facility, FacilityId};
use serde::{Deserialize, Serialize};

/// Attribute types that count towards `shared_types`.
///
/// Owner links are excluded: sharing an owner is expected for chains.
const SCORED_TYPES: [AttributeType; 3] = [
    AttributeType::Phone,
    AttributeType::Address,
    AttributeType::Admin,
];

/// Number of distinct phone/address/admin link types present in a cluster
pub fn shared_types(cluster: &Cluster) -> usize {
    SCORED_TYPES
        .iter()
        .filter(|t| cluster.connection_count(**t) > 0)
        .count()
}

/// Multiplier for the cluster's combined revenue
pub fn revenue_factor(total_revenue: f64, weights: &SignalWeights) -> f64 {
    if total_revenue > weights.extreme_revenue {
        weights.extreme_revenue_factor
    } else if total_revenue > weights.elevated_revenue {
        weights.elevated_revenue_factor
    } else {
        1.0
    }
}

pub fn risk_score(cluster: &Cluster, weights: &SignalWeights) -> f64 {
    let income_factor = if cluster.has_negative_income {
        weights.negative_income_factor
    } else {
        1.0
    };

    cluster.facility_count as f64
        * (1.0 + shared_types(cluster) as f64 * weights.shared_type_weight)
        * revenue_factor(cluster.total_revenue, weights)
        * income_factor
}

/// Whether a cluster's score puts it in the review-first tier
pub fn is_priority(cluster: &Cluster, weights: &SignalWeights) -> bool {
    cluster.risk_score > weights.priority_threshold
}

// ============================================================================
// FACILITY SIGNALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// Revenue per visit far from the batch mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePerVisitAlert {
    pub facility_id: FacilityId,
    pub revenue: f64,
    pub total_visits: i64,
    pub revenue_per_visit: f64,
    pub z_score: f64,
    pub severity: Severity,
}

/// Net margin outside the expected band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAlert {
    pub facility_id: FacilityId,
    pub revenue: f64,
    pub net_income: f64,
    pub margin: f64,
    pub severity: Severity,
}

/// Per-facility financial signals of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityAnomalies {
    /// Strongest outlier first
    pub revenue_per_visit: Vec<RevenuePerVisitAlert>,

    /// Widest margin first
    pub extreme_margins: Vec<MarginAlert>,

    /// Facilities with no linked financial record, in input order
    pub missing_financials: Vec<FacilityId>,
}

impl FacilityAnomalies {
    pub fn detect(
        facilities: &[Facility],
        financials: &FinancialJoin,
        thresholds: &AnomalyThresholds,
    ) -> Self {
        FacilityAnomalies {
            revenue_per_visit: revenue_per_visit_outliers(facilities, financials, thresholds),
            extreme_margins: extreme_margins(facilities, financials, thresholds),
            missing_financials: missing_financials(facilities, financials),
        }
    }

    pub fn alert_count(&self) -> usize {
        self.revenue_per_visit.len() + self.extreme_margins.len()
    }
}

/// Linked summaries in facility input order
fn summaries_in_order<'a>(
    facilities: &'a [Facility],
    financials: &'a FinancialJoin,
) -> impl Iterator<Item = &'a FinancialSummary> {
    facilities.iter().filter_map(move |f| financials.summary(&f.id))
}

/// Facilities whose revenue per visit sits more than `revenue_per_visit_z`
/// sample standard deviations from the batch mean.
///
/// Only facilities with positive revenue and visits take part. Fewer than
/// two of them, or no spread at all, yields no alerts.
pub fn revenue_per_visit_outliers(
    facilities: &[Facility],
    financials: &FinancialJoin,
    thresholds: &AnomalyThresholds,
) -> Vec<RevenuePerVisitAlert> {
    let rates: Vec<(&FinancialSummary, i64, f64)> = summaries_in_order(facilities, financials)
        .filter_map(|s| match s.total_visits {
            Some(visits) if visits > 0 && s.total_revenue > 0.0 => {
                Some((s, visits, s.total_revenue / visits as f64))
            }
            _ => None,
        })
        .collect();

    if rates.len() < 2 {
        return Vec::new();
    }

    let n = rates.len() as f64;
    let mean = rates.iter().map(|(_, _, rate)| rate).sum::<f64>() / n;
    let variance = rates
        .iter()
        .map(|(_, _, rate)| (rate - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let stdev = variance.sqrt();
    if stdev.is_nan() || stdev <= 0.0 {
        return Vec::new();
    }

    let mut alerts: Vec<RevenuePerVisitAlert> = rates
        .into_iter()
        .filter_map(|(summary, visits, rate)| {
            let z_score = (rate - mean) / stdev;
            if z_score.abs() <= thresholds.revenue_per_visit_z {
                return None;
            }
            Some(RevenuePerVisitAlert {
                facility_id: summary.facility_id.clone(),
                revenue: summary.total_revenue,
                total_visits: visits,
                revenue_per_visit: rate,
                z_score,
                severity: if z_score.abs() > thresholds.revenue_per_visit_z_high {
                    Severity::High
                } else {
                    Severity::Medium
                },
            })
        })
        .collect();

    alerts.sort_by(|a, b| b.z_score.abs().total_cmp(&a.z_score.abs()));
    alerts
}

/// Facilities with positive revenue whose net margin is above `high_margin`
/// or below `low_margin`
pub fn extreme_margins(
    facilities: &[Facility],
    financials: &FinancialJoin,
    thresholds: &AnomalyThresholds,
) -> Vec<MarginAlert> {
    let mut alerts: Vec<MarginAlert> = summaries_in_order(facilities, financials)
        .filter(|s| s.total_revenue > 0.0)
        .filter_map(|s| {
            let margin = s.net_income / s.total_revenue;
            if margin <= thresholds.high_margin && margin >= thresholds.low_margin {
                return None;
            }
            Some(MarginAlert {
                facility_id: s.facility_id.clone(),
                revenue: s.total_revenue,
                net_income: s.net_income,
                margin,
                severity: if margin.abs() > thresholds.extreme_margin {
                    Severity::High
                } else {
                    Severity::Medium
                },
            })
        })
        .collect();

    alerts.sort_by(|a, b| b.margin.abs().total_cmp(&a.margin.abs()));
    alerts
}

pub fn missing_financials(facilities: &[Facility], financials: &FinancialJoin) -> Vec<FacilityId> {
    facilities
        .iter()
        .filter(|f| financials.summary(&f.id).is_none())
        .map(|f| f.id.clone())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
