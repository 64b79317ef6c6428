// 📋 Cluster Report - Analyst-facing text report and JSON export

use crate::clustering::Cluster;
use crate::grouping::AttributeType;
use crate::pipeline::Analysis;
use crate::query::SortKey;
use crate::signals;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Write};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Members listed per cluster in the text report
const MEMBERS_SHOWN: usize = 15;

/// Shared keys listed per attribute type in the text report
const KEYS_SHOWN: usize = 5;

/// Facility alerts listed per signal in the text report
const ALERTS_SHOWN: usize = 10;

// ============================================================================
// JSON EXPORT
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedCluster<'a> {
    pub rank: usize,
    pub priority: bool,

    #[serde(flatten)]
    pub cluster: &'a Cluster,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterExport<'a> {
    pub batch_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub sort_key: SortKey,
    pub min_size: usize,
    pub clusters: Vec<RankedCluster<'a>>,
}

/// Ranked clusters ready for serialization
pub fn export_clusters(
    analysis: &Analysis,
    min_size: usize,
    key: SortKey,
    limit: Option<usize>,
) -> ClusterExport<'_> {
    let ranked = analysis.get_clusters_sorted(min_size, key);
    let take = limit.unwrap_or(ranked.len());

    let clusters = ranked
        .into_iter()
        .take(take)
        .enumerate()
        .map(|(i, cluster)| RankedCluster {
            rank: i + 1,
            priority: signals::is_priority(cluster, &analysis.config.signals),
            cluster,
        })
        .collect();

    ClusterExport {
        batch_id: analysis.batch_id,
        generated_at: analysis.generated_at,
        sort_key: key,
        min_size,
        clusters,
    }
}

pub fn write_json_export<P: AsRef<Path>>(export: &ClusterExport<'_>, path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(export).context("Failed to serialize cluster export")?;
    fs::write(path.as_ref(), json)
        .with_context(|| format!("Failed to write cluster export: {:?}", path.as_ref()))
}

// ============================================================================
// TEXT REPORT
// ============================================================================

fn format_money(amount: f64) -> String {
    let whole = amount.abs().round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0.0 && whole > 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

fn format_phone(key: &str) -> String {
    if key.len() == 10 && key.chars().all(|c| c.is_ascii_digit()) {
        format!("({}) {}-{}", &key[..3], &key[3..6], &key[6..])
    } else {
        key.to_string()
    }
}

fn write_cluster(out: &mut impl Write, rank: usize, cluster: &Cluster) -> fmt::Result {
    let rule = "=".repeat(60);
    writeln!(out, "{}", rule)?;
    writeln!(out, "CLUSTER #{} - Priority Score: {:.1}", rank, cluster.risk_score)?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "  Facilities: {}", cluster.facility_count)?;
    for attribute in AttributeType::ALL {
        writeln!(out, "  Shared {}: {}", attribute, cluster.connection_count(attribute))?;
    }

    writeln!(out, "\n  FINANCIAL DATA:")?;
    if cluster.linked_count > 0 {
        writeln!(out, "    Total Revenue: {}", format_money(cluster.total_revenue))?;
        writeln!(out, "    Avg Revenue: {}", format_money(cluster.average_revenue))?;
    } else {
        writeln!(out, "    Total Revenue: N/A")?;
    }
    if cluster.total_visits > 0 {
        writeln!(out, "    Total Visits: {}", cluster.total_visits)?;
    }
    if cluster.has_negative_income {
        writeln!(out, "    ⚠️  HAS NEGATIVE NET INCOME")?;
    }

    writeln!(out, "\n  FACILITIES IN CLUSTER:")?;
    for member in cluster.members.iter().take(MEMBERS_SHOWN) {
        match member.revenue {
            Some(revenue) => writeln!(
                out,
                "    - {} [{}] | Rev: {} ({})",
                member.name,
                member.id,
                format_money(revenue),
                member.class.as_str()
            )?,
            None => writeln!(out, "    - {} [{}]", member.name, member.id)?,
        }
    }
    if cluster.members.len() > MEMBERS_SHOWN {
        writeln!(out, "    ... and {} more", cluster.members.len() - MEMBERS_SHOWN)?;
    }

    for attribute in AttributeType::ALL {
        let keys: Vec<&str> = cluster
            .connections
            .iter()
            .filter(|c| c.attribute == attribute)
            .map(|c| c.key.as_str())
            .collect();
        if keys.is_empty() {
            continue;
        }

        writeln!(out, "\n  SHARED {}:", attribute.as_str().to_uppercase())?;
        for key in keys.iter().take(KEYS_SHOWN) {
            match attribute {
                AttributeType::Phone => writeln!(out, "    - {}", format_phone(key))?,
                _ => writeln!(out, "    - {}", key)?,
            }
        }
    }

    writeln!(out)
}

fn write_facility_signals(out: &mut impl Write, analysis: &Analysis) -> fmt::Result {
    let anomalies = analysis.anomalies();

    writeln!(out, "FACILITY SIGNALS")?;
    writeln!(out, "{}", "-".repeat(40))?;

    writeln!(out, "Revenue per visit outliers: {}", anomalies.revenue_per_visit.len())?;
    for alert in anomalies.revenue_per_visit.iter().take(ALERTS_SHOWN) {
        writeln!(
            out,
            "  - [{}] {}/visit over {} visits (z = {:.2}, {:?})",
            alert.facility_id,
            format_money(alert.revenue_per_visit),
            alert.total_visits,
            alert.z_score,
            alert.severity
        )?;
    }

    writeln!(out, "Extreme profit margins: {}", anomalies.extreme_margins.len())?;
    for alert in anomalies.extreme_margins.iter().take(ALERTS_SHOWN) {
        writeln!(
            out,
            "  - [{}] margin {:.1}% on {} revenue ({:?})",
            alert.facility_id,
            alert.margin * 100.0,
            format_money(alert.revenue),
            alert.severity
        )?;
    }

    writeln!(out, "Facilities without financials: {}", anomalies.missing_financials.len())?;

    let collisions = analysis.license_collisions();
    if !collisions.is_empty() {
        writeln!(out, "⚠️  License numbers shared by several facilities: {}", collisions.len())?;
        for collision in collisions.iter().take(ALERTS_SHOWN) {
            writeln!(
                out,
                "  - {}: financials go to [{}], not [{}]",
                collision.license_key, collision.kept, collision.shadowed
            )?;
        }
    }

    writeln!(out)
}

fn write_report(
    out: &mut impl Write,
    analysis: &Analysis,
    min_size: usize,
    key: SortKey,
    limit: usize,
) -> fmt::Result {
    let stats = analysis.stats();
    let ranked = analysis.get_clusters_sorted(min_size, key);
    let priority = analysis.priority_clusters();

    let banner = "=".repeat(80);
    writeln!(out, "{}", banner)?;
    writeln!(out, "HEALTHCARE FACILITY NETWORK ANALYSIS REPORT")?;
    writeln!(out, "Candidate common-ownership clusters with financial data")?;
    writeln!(out, "{}\n", banner)?;

    writeln!(out, "SUMMARY")?;
    writeln!(out, "{}", "-".repeat(40))?;
    writeln!(out, "Batch: {}", analysis.batch_id)?;
    writeln!(out, "Generated: {}", analysis.generated_at.to_rfc3339())?;
    writeln!(out, "Facilities: {}", stats.total_facilities)?;
    writeln!(out, "Facilities in duplicate groups: {}", stats.facilities_in_groups)?;
    for (attribute, count) in &stats.groups_by_type {
        writeln!(out, "  {} groups: {}", attribute, count)?;
    }
    writeln!(out, "Clusters: {} (largest: {})", stats.cluster_count, stats.largest_cluster)?;
    writeln!(
        out,
        "Priority clusters (score > {:.1}): {}",
        analysis.config.signals.priority_threshold,
        priority.len()
    )?;
    writeln!(
        out,
        "Financial records: {} ({} unlinked, {} facilities linked)",
        stats.total_financial_records,
        stats.unlinked_financial_records,
        stats.facilities_with_financials
    )?;
    let priority_revenue: f64 = priority.iter().map(|c| c.total_revenue).sum();
    writeln!(out, "Revenue in priority clusters: {}", format_money(priority_revenue))?;
    writeln!(out)?;

    write_facility_signals(out, analysis)?;

    writeln!(out, "TOP {} CLUSTERS (by {:?}, min size {})", limit, key, min_size)?;
    writeln!(out, "{}\n", "-".repeat(40))?;

    for (i, cluster) in ranked.iter().take(limit).enumerate() {
        write_cluster(out, i + 1, cluster)?;
    }

    writeln!(out, "{}", banner)?;
    writeln!(out, "END OF REPORT")
}

/// Render the analyst report for the top `limit` clusters
pub fn render_report(
    analysis: &Analysis,
    min_size: usize,
    key: SortKey,
    limit: usize,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_report(&mut out, analysis, min_size, key, limit)?;
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NetworkAnalyzer;
    use crate::records::{Facility, FinancialRecord};

    fn sample_analysis() -> Analysis {
        let facilities = vec![
            Facility::new("A", "Sunrise Hospice")
                .with_license("L1")
                .with_address("123 Main St")
                .with_phone("(555) 123-4567"),
            Facility::new("B", "Sunset Hospice")
                .with_address("123 Main St")
                .with_phone("555 123 4567"),
            Facility::new("C", "Lone Pine Care").with_address("1 Pine Road"),
        ];
        let financials =
            vec![FinancialRecord::new(Some("L1"), Some(2024)).with_figures(12_345_678.0, -10.0)];

        NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap()
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "$0");
        assert_eq!(format_money(999.0), "$999");
        assert_eq!(format_money(12_345_678.0), "$12,345,678");
        assert_eq!(format_money(-1_500.0), "-$1,500");
    }

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone("15551234567"), "15551234567");
    }

    #[test]
    fn test_render_report() {
        let analysis = sample_analysis();
        let report = render_report(&analysis, 2, SortKey::Revenue, 10).unwrap();

        assert!(report.contains("CLUSTER #1"));
        assert!(report.contains("Sunrise Hospice [A] | Rev: $12,345,678 (high-revenue)"));
        assert!(report.contains("HAS NEGATIVE NET INCOME"));
        assert!(report.contains("(555) 123-4567"));
        assert!(report.contains("123mainst"));
        assert!(!report.contains("Lone Pine Care"));
        assert!(report.contains("FACILITY SIGNALS"));
        assert!(report.contains("Facilities without financials: 2"));
        assert!(report.ends_with("END OF REPORT\n"));
    }

    #[test]
    fn test_report_lists_facility_alerts_and_collisions() {
        let facilities = vec![
            Facility::new("A", "Harbor Home Health").with_license("L1"),
            Facility::new("B", "Harbor Annex").with_license("l-1"),
            Facility::new("C", "Ridge Care").with_license("L2"),
        ];
        let financials = vec![
            FinancialRecord::new(Some("L1"), Some(2024)).with_figures(1_000.0, 900.0),
            FinancialRecord::new(Some("L2"), Some(2024)).with_figures(1_000.0, 10.0),
        ];
        let analysis = NetworkAnalyzer::default().analyze(&facilities, &financials).unwrap();

        let report = render_report(&analysis, 2, SortKey::Revenue, 10).unwrap();

        assert!(report.contains("Extreme profit margins: 1"));
        assert!(report.contains("[A] margin 90.0% on $1,000 revenue (High)"));
        assert!(report.contains("License numbers shared by several facilities: 1"));
        assert!(report.contains("l1: financials go to [A], not [B]"));
        assert!(report.contains("Facilities without financials: 1"));
    }

    #[test]
    fn test_export_json() {
        let analysis = sample_analysis();
        let export = export_clusters(&analysis, 2, SortKey::RiskScore, Some(5));

        assert_eq!(export.clusters.len(), 1);
        assert_eq!(export.clusters[0].rank, 1);
        // 2 × (1 + 2 × 0.5) × 1.5 × 1.2
        assert!(export.clusters[0].priority);

        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["sortKey"], "risk-score");
        assert_eq!(value["clusters"][0]["facilityCount"], 2);
        assert_eq!(value["clusters"][0]["connectionTypeHistogram"]["address"], 1);

        let file = tempfile::NamedTempFile::new().unwrap();
        write_json_export(&export, file.path()).unwrap();
        let written = std::fs::read_to_string(file.path()).unwrap();
        assert!(written.contains("\"rank\": 1"));
    }
}
