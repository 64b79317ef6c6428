// 🕸️ Cluster Builder - Connected components over duplicate groups
//
// Nodes are facilities, edges are co-membership in a duplicate group. The
// partition comes from a disjoint-set forest; only facilities that appear in
// at least one group ever enter it, so ungrouped facilities can't form
// clusters. Clusters are disjoint, so their aggregates are computed in
// parallel.
//
// Output order is fixed: clusters by the input position of their first
// member, members by input position. Root labels never leave this module.

use crate::config::SignalWeights;
use crate::financial::{FinancialJoin, RevenueClass};
use crate::grouping::{AttributeType, GroupSet};
use crate::records::{Facility, FacilityId};
use crate::signals;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, warn};

// ============================================================================
// DISJOINT SET
// ============================================================================

/// Union-find over facility positions, with path compression and union by rank
#[derive(Debug, Default)]
struct DisjointSet {
    parent: HashMap<usize, usize>,
    rank: HashMap<usize, usize>,
}

impl DisjointSet {
    fn new() -> Self {
        Self::default()
    }

    fn make_set(&mut self, x: usize) {
        self.parent.entry(x).or_insert(x);
        self.rank.entry(x).or_insert(0);
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[&root] != root {
            root = self.parent[&root];
        }

        // Path compression
        let mut current = x;
        while current != root {
            let next = self.parent[&current];
            self.parent.insert(current, root);
            current = next;
        }

        root
    }

    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);

        if root_x == root_y {
            return;
        }

        let rank_x = self.rank[&root_x];
        let rank_y = self.rank[&root_y];

        match rank_x.cmp(&rank_y) {
            std::cmp::Ordering::Greater => {
                self.parent.insert(root_y, root_x);
            }
            std::cmp::Ordering::Less => {
                self.parent.insert(root_x, root_y);
            }
            std::cmp::Ordering::Equal => {
                self.parent.insert(root_y, root_x);
                self.rank.insert(root_x, rank_x + 1);
            }
        }
    }

    /// Elements in ascending order
    fn elements(&self) -> Vec<usize> {
        let mut elements: Vec<usize> = self.parent.keys().copied().collect();
        elements.sort_unstable();
        elements
    }
}

// ============================================================================
// CLUSTER
// ============================================================================

/// One facility inside a cluster, with its financial picture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMember {
    pub id: FacilityId,
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,

    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub visits: Option<i64>,
    pub class: RevenueClass,
}

/// A shared key that links facilities inside a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub attribute: AttributeType,
    pub key: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub members: Vec<ClusterMember>,
    pub facility_count: usize,

    /// Sum of member revenue; members without financials count as 0
    pub total_revenue: f64,

    /// Distinct groups inside this cluster, by attribute type
    pub connection_type_histogram: BTreeMap<AttributeType, usize>,

    pub connections: Vec<Connection>,

    /// Members with a linked financial record
    pub linked_count: usize,

    /// Mean over members reporting positive revenue
    pub average_revenue: f64,

    pub total_visits: i64,
    pub has_negative_income: bool,

    /// SHA-256 of the sorted member ids
    pub fingerprint: String,

    pub risk_score: f64,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.facility_count
    }

    pub fn contains(&self, facility_id: &str) -> bool {
        self.members.iter().any(|m| m.id == facility_id)
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn connection_count(&self, attribute: AttributeType) -> usize {
        self.connection_type_histogram
            .get(&attribute)
            .copied()
            .unwrap_or(0)
    }
}

/// Stable hash of a membership set, independent of member order
pub fn cluster_fingerprint<'a>(member_ids: impl IntoIterator<Item = &'a str>) -> String {
    let mut ids: Vec<&str> = member_ids.into_iter().collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// CLUSTER BUILDER
// ============================================================================

/// Facility positions and group indexes making up one component
struct Component {
    positions: Vec<usize>,
    groups: Vec<usize>,
}

pub struct ClusterBuilder {
    pub weights: SignalWeights,
}

impl ClusterBuilder {
    pub fn new() -> Self {
        ClusterBuilder {
            weights: SignalWeights::default(),
        }
    }

    pub fn with_weights(weights: SignalWeights) -> Self {
        ClusterBuilder { weights }
    }

    pub fn build(
        &self,
        groups: &GroupSet,
        facilities: &[Facility],
        financials: &FinancialJoin,
    ) -> Vec<Cluster> {
        let components = self.partition(groups, facilities);

        let clusters: Vec<Cluster> = components
            .into_par_iter()
            .map(|component| self.aggregate(component, groups, facilities, financials))
            .collect();

        info!(
            clusters = clusters.len(),
            largest = clusters.iter().map(|c| c.facility_count).max().unwrap_or(0),
            "clusters built"
        );

        clusters
    }

    /// Union every group's members and split into ordered components
    fn partition(&self, groups: &GroupSet, facilities: &[Facility]) -> Vec<Component> {
        let position: HashMap<&str, usize> = facilities
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.as_str(), i))
            .collect();

        let mut set = DisjointSet::new();
        let mut group_anchor: Vec<Option<usize>> = Vec::with_capacity(groups.len());
        let mut unknown = 0usize;

        for group in groups.iter() {
            let resolved: Vec<usize> = group
                .members
                .iter()
                .filter_map(|member| position.get(member.as_str()).copied())
                .collect();
            unknown += group.members.len() - resolved.len();

            // A group needs two known facilities to link anything
            if resolved.len() < 2 {
                group_anchor.push(None);
                continue;
            }

            let anchor = resolved[0];
            for &pos in &resolved {
                set.make_set(pos);
                set.union(anchor, pos);
            }
            group_anchor.push(Some(anchor));
        }

        if unknown > 0 {
            warn!(unknown, "group members missing from the facility list were ignored");
        }

        // Components in order of their first member's input position
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Component> = Vec::new();

        for pos in set.elements() {
            let root = set.find(pos);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                components.push(Component {
                    positions: Vec::new(),
                    groups: Vec::new(),
                });
                components.len() - 1
            });
            components[slot].positions.push(pos);
        }

        for (group_idx, anchor) in group_anchor.into_iter().enumerate() {
            if let Some(pos) = anchor {
                let root = set.find(pos);
                if let Some(&slot) = slot_of_root.get(&root) {
                    components[slot].groups.push(group_idx);
                }
            }
        }

        components
    }

    fn aggregate(
        &self,
        component: Component,
        groups: &GroupSet,
        facilities: &[Facility],
        financials: &FinancialJoin,
    ) -> Cluster {
        let members: Vec<ClusterMember> = component
            .positions
            .iter()
            .map(|&pos| {
                let facility = &facilities[pos];
                let summary = financials.summary(&facility.id);
                ClusterMember {
                    id: facility.id.clone(),
                    name: facility.name.clone(),
                    category_name: facility.category_name.clone(),
                    revenue: summary.map(|s| s.total_revenue),
                    net_income: summary.map(|s| s.net_income),
                    visits: summary.and_then(|s| s.total_visits),
                    class: financials.class(&facility.id),
                }
            })
            .collect();

        let mut histogram: BTreeMap<AttributeType, usize> = BTreeMap::new();
        let mut connections = Vec::new();
        let mut seen: HashSet<(AttributeType, &str)> = HashSet::new();
        for &group_idx in &component.groups {
            let group = &groups.groups()[group_idx];
            if !seen.insert((group.attribute, group.key.as_str())) {
                continue;
            }
            *histogram.entry(group.attribute).or_insert(0) += 1;
            connections.push(Connection {
                attribute: group.attribute,
                key: group.key.clone(),
                size: group.size(),
            });
        }

        let total_revenue: f64 = members.iter().map(|m| m.revenue.unwrap_or(0.0)).sum();
        let positive: Vec<f64> = members
            .iter()
            .filter_map(|m| m.revenue)
            .filter(|r| *r > 0.0)
            .collect();
        let average_revenue = if positive.is_empty() {
            0.0
        } else {
            positive.iter().sum::<f64>() / positive.len() as f64
        };

        let mut cluster = Cluster {
            facility_count: members.len(),
            total_revenue,
            connection_type_histogram: histogram,
            connections,
            linked_count: members.iter().filter(|m| m.revenue.is_some()).count(),
            average_revenue,
            total_visits: members.iter().filter_map(|m| m.visits).sum(),
            has_negative_income: members
                .iter()
                .any(|m| m.net_income.map(|n| n < 0.0).unwrap_or(false)),
            fingerprint: cluster_fingerprint(members.iter().map(|m| m.id.as_str())),
            risk_score: 0.0,
            members,
        };
        cluster.risk_score = signals::risk_score(&cluster, &self.weights);
        cluster
    }
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
