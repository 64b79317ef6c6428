// Facility Network - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod normalize;       // Comparison keys for raw fields
pub mod records;         // Facility / FinancialRecord schema
pub mod config;          // Thresholds and signal weights
pub mod error;           // Input-contract errors
pub mod grouping;        // Duplicate groups per attribute type
pub mod duplicate_index; // Facility → group memberships
pub mod financial;       // License join + revenue classification
pub mod clustering;      // Union-find clusters + aggregates
pub mod signals;         // Cluster priority + facility outliers
pub mod query;           // Ranking + neighbor lookups
pub mod pipeline;        // Batch run + query surface
pub mod ingest;          // CSV / JSON loaders
pub mod report;          // Text report + JSON export

// Re-export commonly used types
pub use normalize::normalize;
pub use records::{Facility, FacilityId, FinancialRecord};
pub use config::{AnalysisConfig, AnomalyThresholds, KeyThresholds, SignalWeights};
pub use error::{PipelineError, PipelineResult};
pub use grouping::{group_facilities, AttributeType, DuplicateGroup, GroupSet};
pub use duplicate_index::{DuplicateIndex, GroupMembership};
pub use financial::{
    FinancialJoin, FinancialJoiner, FinancialStatus, FinancialSummary,
    LicenseCollision, RevenueClass,
};
pub use clustering::{Cluster, ClusterBuilder, ClusterMember, Connection};
pub use query::{neighbors_of, rank_clusters, Neighbor, SortKey};
pub use signals::{FacilityAnomalies, MarginAlert, RevenuePerVisitAlert, Severity};
pub use pipeline::{run_pipeline, Analysis, DatasetStats, NetworkAnalyzer};
pub use ingest::{load_facilities, load_facilities_csv, load_facilities_json, load_financials_csv};
pub use report::{export_clusters, render_report, write_json_export, ClusterExport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
