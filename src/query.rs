// 🔎 Query / Ranking Surface - Read-only views over clusters and the index
//
// Sorting is stable, so clusters that tie on every key keep the builder's
// order and repeated runs rank identically.

use crate::clustering::Cluster;
use crate::duplicate_index::DuplicateIndex;
use crate::grouping::AttributeType;
use crate::records::FacilityId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::str::FromStr;

// ============================================================================
// SORT KEY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    /// Total revenue, then facility count
    #[default]
    Revenue,

    /// Facility count, then total revenue
    FacilityCount,

    /// Priority score, then total revenue, then facility count
    RiskScore,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "revenue" => Ok(SortKey::Revenue),
            "count" | "facility-count" | "size" => Ok(SortKey::FacilityCount),
            "risk" | "risk-score" | "score" => Ok(SortKey::RiskScore),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

fn by_revenue(a: &Cluster, b: &Cluster) -> Ordering {
    b.total_revenue.total_cmp(&a.total_revenue)
}

fn by_count(a: &Cluster, b: &Cluster) -> Ordering {
    b.facility_count.cmp(&a.facility_count)
}

/// Rank clusters, highest first. Ties keep input order.
pub fn rank_clusters<'a>(
    clusters: impl IntoIterator<Item = &'a Cluster>,
    key: SortKey,
) -> Vec<&'a Cluster> {
    let mut ranked: Vec<&Cluster> = clusters.into_iter().collect();

    match key {
        SortKey::Revenue => ranked.sort_by(|a, b| by_revenue(a, b).then_with(|| by_count(a, b))),
        SortKey::FacilityCount => {
            ranked.sort_by(|a, b| by_count(a, b).then_with(|| by_revenue(a, b)))
        }
        SortKey::RiskScore => ranked.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| by_revenue(a, b))
                .then_with(|| by_count(a, b))
        }),
    }

    ranked
}

/// Clusters with at least `min_size` facilities, in input order
pub fn clusters_with_min_size(clusters: &[Cluster], min_size: usize) -> Vec<&Cluster> {
    clusters
        .iter()
        .filter(|c| c.facility_count >= min_size)
        .collect()
}

// ============================================================================
// NEIGHBORS
// ============================================================================

/// A facility directly linked to another through one attribute type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub neighbor_id: FacilityId,
    pub attribute: AttributeType,
}

/// Every facility sharing a group with `facility_id`, one entry per
/// `(neighbor, type)`.
pub fn neighbors_of(index: &DuplicateIndex, facility_id: &str) -> Vec<Neighbor> {
    let mut seen: HashSet<(&str, AttributeType)> = HashSet::new();
    let mut neighbors = Vec::new();

    for membership in index.memberships(facility_id) {
        for other in &membership.other_member_ids {
            if other == facility_id {
                continue;
            }
            if seen.insert((other.as_str(), membership.attribute)) {
                neighbors.push(Neighbor {
                    neighbor_id: other.clone(),
                    attribute: membership.attribute,
                });
            }
        }
    }

    neighbors
}

// ============================================================================
// TESTS
// ============================================================================
