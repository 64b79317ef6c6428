// ⚙️ Analysis Configuration - Thresholds as data
//
// Loaded from a JSON file (every field optional) or built from defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// KEY THRESHOLDS
// ============================================================================

/// Minimum normalized-key lengths per attribute type.
///
/// These suppress false duplicates anchored on empty or near-empty fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyThresholds {
    /// Address key must be strictly longer than this
    pub address_min_len: usize,

    /// Phone key must contain at least this many digits
    pub phone_min_digits: usize,

    /// Owner key must be strictly longer than this
    pub owner_min_len: usize,

    /// Admin contact key must be strictly longer than this
    pub admin_min_len: usize,
}

impl Default for KeyThresholds {
    fn default() -> Self {
        KeyThresholds {
            address_min_len: 5,
            phone_min_digits: 10,
            owner_min_len: 3,
            admin_min_len: 5,
        }
    }
}

// ============================================================================
// SIGNAL WEIGHTS
// ============================================================================

/// Weights for the cluster priority signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    /// Added to the base multiplier for each shared phone/address/admin type
    pub shared_type_weight: f64,

    /// Cluster revenue above this gets `elevated_revenue_factor`
    pub elevated_revenue: f64,
    pub elevated_revenue_factor: f64,

    /// Cluster revenue above this gets `extreme_revenue_factor`
    pub extreme_revenue: f64,
    pub extreme_revenue_factor: f64,

    /// Applied when any member reports negative net income
    pub negative_income_factor: f64,

    /// Clusters scoring above this are flagged for review first
    pub priority_threshold: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        SignalWeights {
            shared_type_weight: 0.5,
            elevated_revenue: 10_000_000.0,
            elevated_revenue_factor: 1.5,
            extreme_revenue: 50_000_000.0,
            extreme_revenue_factor: 2.0,
            negative_income_factor: 1.2,
            priority_threshold: 3.0,
        }
    }
}

// ============================================================================
// ANOMALY THRESHOLDS
// ============================================================================

/// Cut-offs for the per-facility financial signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    /// Revenue-per-visit |z| above this is flagged
    pub revenue_per_visit_z: f64,

    /// |z| above this is high severity
    pub revenue_per_visit_z_high: f64,

    /// Net margin above this is flagged
    pub high_margin: f64,

    /// Net margin below this is flagged
    pub low_margin: f64,

    /// |margin| above this is high severity
    pub extreme_margin: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        AnomalyThresholds {
            revenue_per_visit_z: 2.0,
            revenue_per_visit_z_high: 3.0,
            high_margin: 0.5,
            low_margin: -0.2,
            extreme_margin: 0.7,
        }
    }
}

// ============================================================================
// ANALYSIS CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub thresholds: KeyThresholds,

    /// Revenue at or above this classifies a facility as high-revenue
    pub high_revenue_threshold: f64,

    /// Default minimum cluster size for cluster listings
    pub min_cluster_size: usize,

    pub signals: SignalWeights,

    pub anomalies: AnomalyThresholds,
}

impl AnalysisConfig {
    /// Create config with default thresholds
    pub fn new() -> Self {
        AnalysisConfig {
            thresholds: KeyThresholds::default(),
            high_revenue_threshold: 3_000_000.0,
            min_cluster_size: 2,
            signals: SignalWeights::default(),
            anomalies: AnomalyThresholds::default(),
        }
    }

    /// Load config from JSON file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
