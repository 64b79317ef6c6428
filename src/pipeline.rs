// 🏗️ Network Analyzer - Full batch pipeline and its query surface
//
// facilities + financials → groups → duplicate index → financial join →
// clusters. Every run builds a fresh, complete `Analysis`; nothing is
// updated incrementally and nothing is published until the pass finishes.

use crate::clustering::{Cluster, ClusterBuilder};
use crate::config::AnalysisConfig;
use crate::duplicate_index::{DuplicateIndex, GroupMembership};
use crate::error::{PipelineError, PipelineResult};
use crate::financial::{FinancialJoin, FinancialJoiner, FinancialStatus, LicenseCollision};
use crate::grouping::{group_facilities, AttributeType, GroupSet};
use crate::query::{clusters_with_min_size, neighbors_of, rank_clusters, Neighbor, SortKey};
use crate::records::{Facility, FacilityId, FinancialRecord};
use crate::signals::{self, FacilityAnomalies};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

// ============================================================================
// DATASET STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_facilities: usize,
    pub total_financial_records: usize,
    pub facilities_with_financials: usize,
    pub unlinked_financial_records: usize,
    pub license_collisions: usize,

    /// Over facilities reporting positive revenue
    pub total_revenue: f64,
    pub average_revenue: f64,
    pub min_revenue: f64,
    pub max_revenue: f64,

    pub groups_by_type: BTreeMap<AttributeType, usize>,
    pub facilities_in_groups: usize,
    pub cluster_count: usize,
    pub largest_cluster: usize,

    /// Revenue-per-visit and margin alerts
    pub facility_alerts: usize,
}

impl DatasetStats {
    pub fn summary(&self) -> String {
        format!(
            "{} facilities, {} financial records ({} unlinked), {} clusters (largest: {})",
            self.total_facilities,
            self.total_financial_records,
            self.unlinked_financial_records,
            self.cluster_count,
            self.largest_cluster
        )
    }
}

// ============================================================================
// ANALYSIS
// ============================================================================

/// Immutable result of one pipeline run
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Identifies this batch run; a rebuild gets a new one
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub config: AnalysisConfig,

    groups: GroupSet,
    index: DuplicateIndex,
    financials: FinancialJoin,
    clusters: Vec<Cluster>,
    cluster_of: HashMap<FacilityId, usize>,
    anomalies: FacilityAnomalies,
    stats: DatasetStats,
}

impl Analysis {
    /// Clusters with at least `min_size` facilities, ranked by revenue
    pub fn get_clusters(&self, min_size: usize) -> Vec<&Cluster> {
        self.get_clusters_sorted(min_size, SortKey::Revenue)
    }

    pub fn get_clusters_sorted(&self, min_size: usize, key: SortKey) -> Vec<&Cluster> {
        rank_clusters(clusters_with_min_size(&self.clusters, min_size), key)
    }

    /// Clusters in build order (first member's input position)
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Clusters above the priority threshold, highest score first
    pub fn priority_clusters(&self) -> Vec<&Cluster> {
        rank_clusters(&self.clusters, SortKey::RiskScore)
            .into_iter()
            .filter(|c| signals::is_priority(c, &self.config.signals))
            .collect()
    }

    pub fn get_duplicates_for_facility(&self, facility_id: &str) -> &[GroupMembership] {
        self.index.memberships(facility_id)
    }

    /// Attribute types linking a facility to any other, in type order
    pub fn badges(&self, facility_id: &str) -> Vec<AttributeType> {
        self.index.badges(facility_id)
    }

    pub fn get_financial_summary(&self, facility_id: &str) -> FinancialStatus {
        self.financials.status(facility_id)
    }

    pub fn get_unlinked_financial_records(&self) -> &[FinancialRecord] {
        &self.financials.unlinked
    }

    pub fn neighbors_of(&self, facility_id: &str) -> Vec<Neighbor> {
        neighbors_of(&self.index, facility_id)
    }

    pub fn cluster_for(&self, facility_id: &str) -> Option<&Cluster> {
        self.cluster_of
            .get(facility_id)
            .map(|&idx| &self.clusters[idx])
    }

    pub fn license_collisions(&self) -> &[LicenseCollision] {
        &self.financials.collisions
    }

    pub fn groups(&self) -> &GroupSet {
        &self.groups
    }

    /// Per-facility financial outliers and facilities without financials
    pub fn anomalies(&self) -> &FacilityAnomalies {
        &self.anomalies
    }

    pub fn stats(&self) -> &DatasetStats {
        &self.stats
    }
}

// ============================================================================
// NETWORK ANALYZER
// ============================================================================

pub struct NetworkAnalyzer {
    pub config: AnalysisConfig,
}

impl NetworkAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        NetworkAnalyzer { config }
    }

    /// Run the whole pipeline over one batch.
    ///
    /// Fails only when the facility list breaks the id contract.
    pub fn analyze(
        &self,
        facilities: &[Facility],
        financials: &[FinancialRecord],
    ) -> PipelineResult<Analysis> {
        validate_facility_ids(facilities)?;

        info!(
            facilities = facilities.len(),
            financial_records = financials.len(),
            "starting network analysis"
        );

        let groups = group_facilities(facilities, &self.config.thresholds);
        let index = DuplicateIndex::build(&groups);
        let join = FinancialJoiner::with_threshold(self.config.high_revenue_threshold)
            .join(facilities, financials);
        let clusters = ClusterBuilder::with_weights(self.config.signals.clone())
            .build(&groups, facilities, &join);

        let mut cluster_of = HashMap::new();
        for (idx, cluster) in clusters.iter().enumerate() {
            for member in &cluster.members {
                cluster_of.insert(member.id.clone(), idx);
            }
        }

        let anomalies = FacilityAnomalies::detect(facilities, &join, &self.config.anomalies);
        let stats =
            compute_stats(facilities, financials, &groups, &index, &join, &clusters, &anomalies);
        info!("{}", stats.summary());

        Ok(Analysis {
            batch_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            config: self.config.clone(),
            groups,
            index,
            financials: join,
            clusters,
            cluster_of,
            anomalies,
            stats,
        })
    }
}

impl Default for NetworkAnalyzer {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

/// Run the pipeline with the given config
pub fn run_pipeline(
    facilities: &[Facility],
    financials: &[FinancialRecord],
    config: &AnalysisConfig,
) -> PipelineResult<Analysis> {
    NetworkAnalyzer::new(config.clone()).analyze(facilities, financials)
}

fn validate_facility_ids(facilities: &[Facility]) -> PipelineResult<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(facilities.len());

    for (index, facility) in facilities.iter().enumerate() {
        if facility.id.trim().is_empty() {
            return Err(PipelineError::EmptyFacilityId { index });
        }
        if !seen.insert(facility.id.as_str()) {
            return Err(PipelineError::DuplicateFacilityId {
                id: facility.id.clone(),
            });
        }
    }

    Ok(())
}

fn compute_stats(
    facilities: &[Facility],
    financials: &[FinancialRecord],
    groups: &GroupSet,
    index: &DuplicateIndex,
    join: &FinancialJoin,
    clusters: &[Cluster],
    anomalies: &FacilityAnomalies,
) -> DatasetStats {
    // Facility order keeps the revenue sum reproducible
    let revenues: Vec<f64> = facilities
        .iter()
        .filter_map(|f| join.summary(&f.id))
        .map(|s| s.total_revenue)
        .filter(|r| *r > 0.0)
        .collect();

    let total_revenue: f64 = revenues.iter().sum();
    let (min_revenue, max_revenue) = if revenues.is_empty() {
        (0.0, 0.0)
    } else {
        (
            revenues.iter().copied().fold(f64::INFINITY, f64::min),
            revenues.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    };

    DatasetStats {
        total_facilities: facilities.len(),
        total_financial_records: financials.len(),
        facilities_with_financials: join.linked_facility_count(),
        unlinked_financial_records: join.unlinked.len(),
        license_collisions: join.collisions.len(),
        total_revenue,
        average_revenue: if revenues.is_empty() {
            0.0
        } else {
            total_revenue / revenues.len() as f64
        },
        min_revenue,
        max_revenue,
        groups_by_type: groups.counts_by_type().into_iter().collect(),
        facilities_in_groups: index.facility_count(),
        cluster_count: clusters.len(),
        largest_cluster: clusters.iter().map(|c| c.facility_count).max().unwrap_or(0),
        facility_alerts: anomalies.alert_count(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::financial::RevenueClass;
    use proptest::prelude::*;

    fn create_test_facility(id: &str, license: &str, address: &str, phone: &str) -> Facility {
        Facility::new(id, format!("Facility {}", id))
            .with_license(license)
            .with_address(address)
            .with_phone(phone)
    }

    fn sample_batch() -> (Vec<Facility>, Vec<FinancialRecord>) {
        let facilities = vec![
            create_test_facility("A", "L-001", "123 Main St", "5551234567"),
            create_test_facility("B", "L-002", "123 Main St", "5559999999"),
            create_test_facility("C", "L-003", "77 Harbor Blvd", "5559999999"),
            create_test_facility("D", "L-004", "8 Quiet Lane", "5550000000")
                .with_owner("Golden Care Holdings"),
            create_test_facility("E", "L-005", "19 Mesa Drive", "5550000001")
                .with_owner("GOLDEN CARE HOLDINGS"),
            create_test_facility("F", "L-006", "404 Solo Road", "5550000002"),
        ];

        let financials = vec![
            FinancialRecord::new(Some("l 001"), Some(2024)).with_figures(3_000_000.0, -500.0),
            FinancialRecord::new(Some("L002"), Some(2024)).with_figures(400_000.0, 12_000.0),
            FinancialRecord::new(Some("L-004"), Some(2024)).with_figures(9_000_000.0, 1.0),
            FinancialRecord::new(Some(""), Some(2024)).with_figures(77_000.0, 1.0),
            FinancialRecord::new(Some("L-999"), Some(2024)).with_figures(5.0, 1.0),
        ];

        (facilities, financials)
    }

    #[test]
    fn test_end_to_end_clusters() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        let clusters = analysis.get_clusters(2);
        assert_eq!(clusters.len(), 2);

        // D+E: 9M revenue ranks above A+B+C: 3.4M
        assert_eq!(clusters[0].member_ids(), vec!["D", "E"]);
        assert_eq!(clusters[0].total_revenue, 9_000_000.0);
        assert_eq!(clusters[1].member_ids(), vec!["A", "B", "C"]);
        assert_eq!(clusters[1].total_revenue, 3_400_000.0);

        assert_eq!(analysis.get_clusters(3).len(), 1);
        assert!(analysis.cluster_for("F").is_none());
        assert_eq!(analysis.cluster_for("C").unwrap().facility_count, 3);
    }

    #[test]
    fn test_financial_surface() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        assert_eq!(analysis.get_financial_summary("A").class(), RevenueClass::HighRevenue);
        assert_eq!(analysis.get_financial_summary("B").class(), RevenueClass::Profitable);
        assert_eq!(analysis.get_financial_summary("F"), FinancialStatus::NoData);

        let unlinked = analysis.get_unlinked_financial_records();
        assert_eq!(unlinked.len(), 2);
        assert_eq!(unlinked[0].license_number.as_deref(), Some(""));
        assert_eq!(unlinked[1].license_number.as_deref(), Some("L-999"));
    }

    #[test]
    fn test_duplicate_surface() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        let b = analysis.get_duplicates_for_facility("B");
        assert_eq!(b.len(), 2);
        assert_eq!(b[0].attribute, AttributeType::Address);
        assert_eq!(b[0].other_member_ids, vec!["A".to_string()]);
        assert_eq!(b[1].attribute, AttributeType::Phone);
        assert_eq!(b[1].other_member_ids, vec!["C".to_string()]);

        assert!(analysis.get_duplicates_for_facility("F").is_empty());
        assert_eq!(analysis.neighbors_of("A").len(), 1);
    }

    #[test]
    fn test_stats() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();
        let stats = analysis.stats();

        assert_eq!(stats.total_facilities, 6);
        assert_eq!(stats.total_financial_records, 5);
        assert_eq!(stats.facilities_with_financials, 3);
        assert_eq!(stats.unlinked_financial_records, 2);
        assert_eq!(stats.total_revenue, 12_400_000.0);
        assert_eq!(stats.min_revenue, 400_000.0);
        assert_eq!(stats.max_revenue, 9_000_000.0);
        assert_eq!(stats.groups_by_type.get(&AttributeType::Owner), Some(&1));
        assert_eq!(stats.facilities_in_groups, 5);
        assert_eq!(stats.cluster_count, 2);
        assert_eq!(stats.largest_cluster, 3);
    }

    #[test]
    fn test_priority_clusters() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        // A+B+C: 3 × (1 + 2 × 0.5) × 1.0 × 1.2 = 7.2; D+E (owner only): 2.0
        let priority = analysis.priority_clusters();
        assert_eq!(priority.len(), 1);
        assert_eq!(priority[0].member_ids(), vec!["A", "B", "C"]);
        assert!((priority[0].risk_score - 7.2).abs() < 1e-9);
    }

    #[test]
    fn test_badges_and_groups() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        assert_eq!(analysis.badges("B"), vec![AttributeType::Address, AttributeType::Phone]);
        assert_eq!(analysis.badges("D"), vec![AttributeType::Owner]);
        assert!(analysis.badges("F").is_empty());

        let groups = analysis.groups();
        assert_eq!(groups.len(), 3);
        let owner = groups.get(AttributeType::Owner, "goldencareholdings").unwrap();
        assert_eq!(owner.members, vec!["D".to_string(), "E".to_string()]);
    }

    #[test]
    fn test_license_collisions_surface() {
        let facilities = vec![
            create_test_facility("A", "L-001", "1 First Street", ""),
            create_test_facility("B", "l001", "2 Second Street", ""),
        ];
        let financials =
            vec![FinancialRecord::new(Some("L001"), Some(2024)).with_figures(10.0, 1.0)];

        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        let collisions = analysis.license_collisions();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].kept, "A");
        assert_eq!(collisions[0].shadowed, "B");
        assert_eq!(analysis.stats().license_collisions, 1);
        assert_eq!(analysis.get_financial_summary("B"), FinancialStatus::NoData);
    }

    #[test]
    fn test_anomalies_surface() {
        let (facilities, financials) = sample_batch();
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();
        let anomalies = analysis.anomalies();

        // No visits on file, so no revenue-per-visit signal
        assert!(anomalies.revenue_per_visit.is_empty());
        assert_eq!(anomalies.missing_financials, vec!["C", "E", "F"]);
        assert!(anomalies.extreme_margins.is_empty());
        assert_eq!(analysis.stats().facility_alerts, 0);
    }

    #[test]
    fn test_nan_revenue_does_not_rank_first() {
        let facilities = vec![
            create_test_facility("A", "L-1", "1 Harbor Way", ""),
            create_test_facility("B", "L-2", "1 Harbor Way", ""),
            create_test_facility("C", "L-3", "9 Ridge Road", ""),
            create_test_facility("D", "L-4", "9 Ridge Road", ""),
        ];
        let financials = vec![
            FinancialRecord::new(Some("L-1"), Some(2024)).with_figures(f64::NAN, 1.0),
            FinancialRecord::new(Some("L-3"), Some(2024)).with_figures(500.0, 1.0),
        ];

        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();
        let ranked = analysis.get_clusters(2);

        assert_eq!(ranked[0].member_ids(), vec!["C", "D"]);
        assert_eq!(ranked[1].total_revenue, 0.0);
        assert!(analysis.stats().total_revenue.is_finite());
    }

    #[test]
    fn test_empty_id_rejected() {
        let facilities = vec![Facility::new("A", "a"), Facility::new("  ", "blank")];
        let result = NetworkAnalyzer::default().analyze(&facilities, &[]);

        assert_eq!(result.unwrap_err(), PipelineError::EmptyFacilityId { index: 1 });
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let facilities = vec![Facility::new("A", "a"), Facility::new("A", "again")];
        let result = NetworkAnalyzer::default().analyze(&facilities, &[]);

        assert_eq!(
            result.unwrap_err(),
            PipelineError::DuplicateFacilityId { id: "A".to_string() }
        );
    }

    #[test]
    fn test_empty_batch() {
        let analysis = run_pipeline(&[], &[], &AnalysisConfig::default()).unwrap();

        assert!(analysis.clusters().is_empty());
        assert_eq!(analysis.stats().largest_cluster, 0);
        assert_eq!(analysis.stats().average_revenue, 0.0);
    }

    #[test]
    fn test_each_run_is_a_new_batch() {
        let (facilities, financials) = sample_batch();
        let first = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();
        let second = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(first.clusters(), second.clusters());
    }

    fn arb_batch() -> impl Strategy<Value = (Vec<Facility>, Vec<FinancialRecord>)> {
        let facilities = prop::collection::vec((0usize..5, 0usize..5, 0usize..3), 1..20);
        let financials = prop::collection::vec((0usize..25, 0u32..5_000_000, -50_000i32..50_000), 0..20);

        (facilities, financials).prop_map(|(facs, fins)| {
            let facilities = facs
                .into_iter()
                .enumerate()
                .map(|(i, (addr, phone, owner))| {
                    Facility::new(format!("F{}", i), "f")
                        .with_license(format!("LIC-{}", i))
                        .with_address(format!("{} Canyon Road", addr))
                        .with_phone(format!("310555000{}", phone))
                        .with_owner(format!("Owner Group {}", owner))
                })
                .collect();
            let financials = fins
                .into_iter()
                .map(|(lic, revenue, net)| {
                    let license = format!("lic {}", lic);
                    FinancialRecord::new(Some(license.as_str()), Some(2024))
                        .with_figures(revenue as f64, net as f64)
                })
                .collect();
            (facilities, financials)
        })
    }

    proptest! {
        #[test]
        fn prop_pipeline_is_idempotent((facilities, financials) in arb_batch()) {
            let config = AnalysisConfig::default();
            let first = run_pipeline(&facilities, &financials, &config).unwrap();
            let second = run_pipeline(&facilities, &financials, &config).unwrap();

            prop_assert_eq!(first.clusters(), second.clusters());

            let rank_a: Vec<&str> = first.get_clusters(2).into_iter().map(|c| c.fingerprint.as_str()).collect();
            let rank_b: Vec<&str> = second.get_clusters(2).into_iter().map(|c| c.fingerprint.as_str()).collect();
            prop_assert_eq!(rank_a, rank_b);
        }

        #[test]
        fn prop_unlinked_records_contribute_nothing((facilities, financials) in arb_batch()) {
            let analysis = run_pipeline(&facilities, &financials, &AnalysisConfig::default()).unwrap();
            let stats = analysis.stats();

            prop_assert_eq!(
                stats.unlinked_financial_records + analysis.financials.linked.len(),
                financials.len()
            );
            for cluster in analysis.clusters() {
                let expected: f64 = cluster
                    .members
                    .iter()
                    .map(|m| analysis.financials.revenue(&m.id))
                    .sum();
                prop_assert_eq!(cluster.total_revenue, expected);
            }
        }
    }
}
