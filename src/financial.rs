// 💰 Financial Joiner - Attach fiscal extracts to facilities
//
// Records are matched on the normalized license number. A record that
// matches nothing is kept on the unlinked list for audit, never dropped.
// When two facilities normalize to the same license key the first one wins;
// the shadowed facility is recorded as a collision and logged.

use crate::normalize::normalize;
use crate::records::{Facility, FacilityId, FinancialRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

// ============================================================================
// REVENUE CLASS
// ============================================================================

/// Per-facility financial classification, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevenueClass {
    HighRevenue,
    Profitable,
    Losing,
    Breakeven,
    NoData,
}

impl RevenueClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueClass::HighRevenue => "high-revenue",
            RevenueClass::Profitable => "profitable",
            RevenueClass::Losing => "losing",
            RevenueClass::Breakeven => "breakeven",
            RevenueClass::NoData => "no-data",
        }
    }

    /// Classify one facility's figures.
    ///
    /// Revenue at or above the threshold always wins, whatever the sign of
    /// net income.
    pub fn classify(revenue: f64, net_income: f64, high_revenue_threshold: f64) -> Self {
        if revenue >= high_revenue_threshold {
            RevenueClass::HighRevenue
        } else if net_income > 0.0 {
            RevenueClass::Profitable
        } else if net_income < 0.0 {
            RevenueClass::Losing
        } else {
            RevenueClass::Breakeven
        }
    }
}

// ============================================================================
// FINANCIAL SUMMARY
// ============================================================================

/// Financial picture of a facility with at least one linked record.
///
/// Figures come from the most recent fiscal year on file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub facility_id: FacilityId,
    pub total_revenue: f64,
    pub total_expenses: Option<f64>,
    pub net_income: f64,
    pub total_visits: Option<i64>,
    pub year: Option<i32>,
    pub class: RevenueClass,

    /// Number of linked records across all years
    pub record_count: usize,

    /// Distinct fiscal years on file, ascending
    pub years: Vec<i32>,
}

/// Lookup result for a facility's financials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum FinancialStatus {
    Linked(FinancialSummary),
    NoData,
}

impl FinancialStatus {
    pub fn class(&self) -> RevenueClass {
        match self {
            FinancialStatus::Linked(summary) => summary.class,
            FinancialStatus::NoData => RevenueClass::NoData,
        }
    }

    pub fn summary(&self) -> Option<&FinancialSummary> {
        match self {
            FinancialStatus::Linked(summary) => Some(summary),
            FinancialStatus::NoData => None,
        }
    }
}

/// Two facilities sharing one normalized license key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseCollision {
    pub license_key: String,
    pub kept: FacilityId,
    pub shadowed: FacilityId,
}

// ============================================================================
// JOIN RESULT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct FinancialJoin {
    summaries: HashMap<FacilityId, FinancialSummary>,

    /// Linked records with `facility_id` resolved, in input order
    pub linked: Vec<FinancialRecord>,

    /// Records with no resolvable license, in input order
    pub unlinked: Vec<FinancialRecord>,

    pub collisions: Vec<LicenseCollision>,
}

impl FinancialJoin {
    pub fn summary(&self, facility_id: &str) -> Option<&FinancialSummary> {
        self.summaries.get(facility_id)
    }

    pub fn status(&self, facility_id: &str) -> FinancialStatus {
        match self.summaries.get(facility_id) {
            Some(summary) => FinancialStatus::Linked(summary.clone()),
            None => FinancialStatus::NoData,
        }
    }

    pub fn class(&self, facility_id: &str) -> RevenueClass {
        self.summaries
            .get(facility_id)
            .map(|s| s.class)
            .unwrap_or(RevenueClass::NoData)
    }

    /// Revenue of a facility, 0 when no record is linked
    pub fn revenue(&self, facility_id: &str) -> f64 {
        self.summaries
            .get(facility_id)
            .map(|s| s.total_revenue)
            .unwrap_or(0.0)
    }

    pub fn summaries(&self) -> impl Iterator<Item = &FinancialSummary> {
        self.summaries.values()
    }

    pub fn linked_facility_count(&self) -> usize {
        self.summaries.len()
    }
}

// ============================================================================
// FINANCIAL JOINER
// ============================================================================

pub struct FinancialJoiner {
    /// Revenue at or above this is high-revenue (default: $3,000,000)
    pub high_revenue_threshold: f64,
}

impl FinancialJoiner {
    pub fn new() -> Self {
        FinancialJoiner {
            high_revenue_threshold: 3_000_000.0,
        }
    }

    pub fn with_threshold(high_revenue_threshold: f64) -> Self {
        FinancialJoiner {
            high_revenue_threshold,
        }
    }

    /// Build `normalized license → facility id`, first facility wins
    pub fn license_lookup(
        &self,
        facilities: &[Facility],
    ) -> (HashMap<String, FacilityId>, Vec<LicenseCollision>) {
        let mut lookup: HashMap<String, FacilityId> = HashMap::new();
        let mut collisions = Vec::new();

        for facility in facilities {
            let key = normalize(facility.license_number.as_deref());
            if key.is_empty() {
                continue;
            }

            match lookup.get(&key) {
                Some(kept) => collisions.push(LicenseCollision {
                    license_key: key,
                    kept: kept.clone(),
                    shadowed: facility.id.clone(),
                }),
                None => {
                    lookup.insert(key, facility.id.clone());
                }
            }
        }

        (lookup, collisions)
    }

    pub fn join(&self, facilities: &[Facility], financials: &[FinancialRecord]) -> FinancialJoin {
        let (lookup, collisions) = self.license_lookup(facilities);

        for collision in &collisions {
            warn!(
                license = %collision.license_key,
                kept = %collision.kept,
                shadowed = %collision.shadowed,
                "license number shared by two facilities; financials attributed to the first"
            );
        }

        let mut linked = Vec::new();
        let mut unlinked = Vec::new();
        let mut non_finite = 0usize;

        for record in financials {
            let key = normalize(record.license_number.as_deref());
            let resolved = if key.is_empty() { None } else { lookup.get(&key) };

            let mut copy = record.clone();
            match resolved {
                Some(facility_id) => {
                    // NaN / infinite figures count as absent
                    non_finite += copy.drop_non_finite();
                    copy.facility_id = Some(facility_id.clone());
                    linked.push(copy);
                }
                None => {
                    copy.facility_id = None;
                    unlinked.push(copy);
                }
            }
        }

        let summaries = self.summarize(&linked);

        info!(
            linked = linked.len(),
            unlinked = unlinked.len(),
            facilities_with_financials = summaries.len(),
            "financial join finished"
        );
        if !unlinked.is_empty() {
            warn!(count = unlinked.len(), "financial records could not be matched to a facility");
        }
        if non_finite > 0 {
            warn!(count = non_finite, "non-finite financial figures treated as missing");
        }

        FinancialJoin {
            summaries,
            linked,
            unlinked,
            collisions,
        }
    }

    /// One summary per facility from its linked records
    fn summarize(&self, linked: &[FinancialRecord]) -> HashMap<FacilityId, FinancialSummary> {
        let mut by_facility: HashMap<&str, Vec<&FinancialRecord>> = HashMap::new();
        for record in linked {
            if let Some(id) = record.facility_id.as_deref() {
                by_facility.entry(id).or_default().push(record);
            }
        }

        by_facility
            .into_iter()
            .map(|(id, records)| (id.to_string(), self.summarize_facility(id, &records)))
            .collect()
    }

    fn summarize_facility(&self, facility_id: &str, records: &[&FinancialRecord]) -> FinancialSummary {
        // Latest year wins; records without a year rank oldest, ties keep the first
        let mut latest = records[0];
        for &record in &records[1..] {
            if record.year > latest.year {
                latest = record;
            }
        }

        let mut years: Vec<i32> = records.iter().filter_map(|r| r.year).collect();
        years.sort_unstable();
        years.dedup();

        let revenue = latest.total_revenue.unwrap_or(0.0);
        let net_income = latest.effective_net_income().unwrap_or(0.0);

        FinancialSummary {
            facility_id: facility_id.to_string(),
            total_revenue: revenue,
            total_expenses: latest.total_expenses,
            net_income,
            total_visits: latest.total_visits,
            year: latest.year,
            class: RevenueClass::classify(revenue, net_income, self.high_revenue_threshold),
            record_count: records.len(),
            years,
        }
    }
}

impl Default for FinancialJoiner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record(license: Option<&str>, revenue: f64, net_income: f64) -> FinancialRecord {
        FinancialRecord::new(license, Some(2024)).with_figures(revenue, net_income)
    }

    #[test]
    fn test_classification_priority() {
        let threshold = 3_000_000.0;

        assert_eq!(RevenueClass::classify(3_000_000.0, -500.0, threshold), RevenueClass::HighRevenue);
        assert_eq!(RevenueClass::classify(2_999_999.0, 10.0, threshold), RevenueClass::Profitable);
        assert_eq!(RevenueClass::classify(100_000.0, -1.0, threshold), RevenueClass::Losing);
        assert_eq!(RevenueClass::classify(100_000.0, 0.0, threshold), RevenueClass::Breakeven);
    }

    #[test]
    fn test_license_normalization_links() {
        let facilities = vec![Facility::new("F1", "Sunrise").with_license("l 001")];
        let financials = vec![create_test_record(Some("L-001"), 500_000.0, 20_000.0)];

        let join = FinancialJoiner::new().join(&facilities, &financials);

        assert!(join.unlinked.is_empty());
        assert_eq!(join.linked.len(), 1);
        assert_eq!(join.linked[0].facility_id.as_deref(), Some("F1"));

        let summary = join.summary("F1").unwrap();
        assert_eq!(summary.total_revenue, 500_000.0);
        assert_eq!(summary.class, RevenueClass::Profitable);
    }

    #[test]
    fn test_empty_license_is_unlinked() {
        let facilities = vec![Facility::new("F1", "Sunrise").with_license("")];
        let financials = vec![
            create_test_record(Some(""), 9_000_000.0, 1.0),
            create_test_record(None, 1.0, 1.0),
        ];

        let join = FinancialJoiner::new().join(&facilities, &financials);

        assert_eq!(join.unlinked.len(), 2);
        assert!(join.linked.is_empty());
        assert_eq!(join.revenue("F1"), 0.0);
        assert_eq!(join.class("F1"), RevenueClass::NoData);
        assert_eq!(join.status("F1"), FinancialStatus::NoData);
    }

    #[test]
    fn test_unmatched_license_is_unlinked() {
        let facilities = vec![Facility::new("F1", "Sunrise").with_license("L-001")];
        let financials = vec![create_test_record(Some("L-999"), 1.0, 1.0)];

        let join = FinancialJoiner::new().join(&facilities, &financials);

        assert_eq!(join.unlinked.len(), 1);
        assert_eq!(join.unlinked[0].license_number.as_deref(), Some("L-999"));
        assert!(join.unlinked[0].facility_id.is_none());
    }

    #[test]
    fn test_license_collision_first_wins() {
        let facilities = vec![
            Facility::new("F1", "First").with_license("L-001"),
            Facility::new("F2", "Second").with_license("l001"),
        ];
        let financials = vec![create_test_record(Some("L001"), 100.0, 1.0)];

        let join = FinancialJoiner::new().join(&facilities, &financials);

        assert_eq!(join.linked[0].facility_id.as_deref(), Some("F1"));
        assert!(join.summary("F2").is_none());
        assert_eq!(
            join.collisions,
            vec![LicenseCollision {
                license_key: "l001".to_string(),
                kept: "F1".to_string(),
                shadowed: "F2".to_string(),
            }]
        );
    }

    #[test]
    fn test_latest_year_drives_summary() {
        let facilities = vec![Facility::new("F1", "Sunrise").with_license("L1")];
        let financials = vec![
            FinancialRecord::new(Some("L1"), Some(2022)).with_figures(4_000_000.0, 10.0),
            FinancialRecord::new(Some("L1"), Some(2024)).with_figures(200_000.0, -50.0),
            FinancialRecord::new(Some("L1"), None).with_figures(1.0, 1.0),
        ];

        let join = FinancialJoiner::new().join(&facilities, &financials);
        let summary = join.summary("F1").unwrap();

        assert_eq!(summary.year, Some(2024));
        assert_eq!(summary.class, RevenueClass::Losing);
        assert_eq!(summary.record_count, 3);
        assert_eq!(summary.years, vec![2022, 2024]);
    }

    #[test]
    fn test_derived_net_income_and_breakeven() {
        let facilities = vec![
            Facility::new("F1", "a").with_license("L1"),
            Facility::new("F2", "b").with_license("L2"),
        ];
        let mut derived = FinancialRecord::new(Some("L1"), Some(2024)).with_expenses(120.0);
        derived.total_revenue = Some(100.0);
        let empty = FinancialRecord::new(Some("L2"), Some(2024));

        let join = FinancialJoiner::new().join(&facilities, &[derived, empty]);

        assert_eq!(join.summary("F1").unwrap().net_income, -20.0);
        assert_eq!(join.class("F1"), RevenueClass::Losing);
        assert_eq!(join.class("F2"), RevenueClass::Breakeven);
    }

    #[test]
    fn test_non_finite_figures_are_missing() {
        let facilities = vec![
            Facility::new("F1", "a").with_license("L1"),
            Facility::new("F2", "b").with_license("L2"),
        ];
        let nan_revenue = create_test_record(Some("L1"), f64::NAN, 500.0);
        let mut nan_net = FinancialRecord::new(Some("L2"), Some(2024)).with_expenses(150.0);
        nan_net.total_revenue = Some(100.0);
        nan_net.net_income = Some(f64::INFINITY);

        let join = FinancialJoiner::new().join(&facilities, &[nan_revenue, nan_net]);

        let first = join.summary("F1").unwrap();
        assert_eq!(first.total_revenue, 0.0);
        assert_eq!(first.class, RevenueClass::Profitable);
        assert!(join.linked[0].total_revenue.is_none());

        // Infinite net income falls back to revenue minus expenses
        let second = join.summary("F2").unwrap();
        assert_eq!(second.net_income, -50.0);
        assert_eq!(second.class, RevenueClass::Losing);
    }

    #[test]
    fn test_custom_threshold() {
        let facilities = vec![Facility::new("F1", "a").with_license("L1")];
        let financials = vec![create_test_record(Some("L1"), 1_000_000.0, -1.0)];

        let join = FinancialJoiner::with_threshold(1_000_000.0).join(&facilities, &financials);
        assert_eq!(join.class("F1"), RevenueClass::HighRevenue);
    }

    #[test]
    fn test_revenue_class_serialization() {
        assert_eq!(
            serde_json::to_string(&RevenueClass::HighRevenue).unwrap(),
            "\"high-revenue\""
        );
        assert_eq!(RevenueClass::NoData.as_str(), "no-data");
    }
}
