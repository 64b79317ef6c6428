// Facility Network - Web Server
// REST API over one immutable analysis batch

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use facility_network::{
    load_facilities, load_financials_csv, AnalysisConfig, Analysis, AttributeType, Cluster,
    DuplicateGroup, FinancialRecord, FinancialStatus, GroupMembership, LicenseCollision,
    Neighbor, NetworkAnalyzer, SortKey,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    analysis: Arc<Analysis>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct GroupQuery {
    attribute: Option<AttributeType>,
}

#[derive(Deserialize)]
struct ClusterQuery {
    min_size: Option<usize>,
    sort: Option<String>,
    limit: Option<usize>,
}

/// Duplicate group membership as seen from one facility
#[derive(Serialize)]
struct DuplicatesResponse<'a> {
    facility_id: String,
    badges: Vec<AttributeType>,
    groups: &'a [GroupMembership],
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/stats - Dataset statistics for this batch
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.analysis.stats().clone()))
}

/// GET /api/clusters?min_size=&sort=&limit= - Ranked clusters
async fn get_clusters(
    State(state): State<AppState>,
    Query(query): Query<ClusterQuery>,
) -> impl IntoResponse {
    let sort = match query.sort.as_deref().map(str::parse::<SortKey>) {
        None => SortKey::Revenue,
        Some(Ok(key)) => key,
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, Json(ApiResponse::err(e))).into_response(),
    };
    let min_size = query
        .min_size
        .unwrap_or(state.analysis.config.min_cluster_size);

    let clusters: Vec<Cluster> = state
        .analysis
        .get_clusters_sorted(min_size, sort)
        .into_iter()
        .take(query.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    (StatusCode::OK, Json(ApiResponse::ok(clusters))).into_response()
}

/// GET /api/facilities/:id/duplicates - Groups the facility belongs to
async fn get_duplicates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let groups = state.analysis.get_duplicates_for_facility(&id);
    Json(ApiResponse::ok(DuplicatesResponse {
        badges: state.analysis.badges(&id),
        facility_id: id.clone(),
        groups,
    }))
    .into_response()
}

/// GET /api/facilities/:id/neighbors - Directly linked facilities
async fn get_neighbors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let neighbors: Vec<Neighbor> = state.analysis.neighbors_of(&id);
    Json(ApiResponse::ok(neighbors))
}

/// GET /api/facilities/:id/financials - Financial summary or no-data
async fn get_financials(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let status: FinancialStatus = state.analysis.get_financial_summary(&id);
    Json(ApiResponse::ok(status))
}

/// GET /api/groups?attribute= - Duplicate groups, optionally of one type
async fn get_groups(
    State(state): State<AppState>,
    Query(query): Query<GroupQuery>,
) -> impl IntoResponse {
    let groups: Vec<DuplicateGroup> = state
        .analysis
        .groups()
        .iter()
        .filter(|g| query.attribute.map_or(true, |a| g.attribute == a))
        .cloned()
        .collect();
    Json(ApiResponse::ok(groups))
}

/// GET /api/anomalies - Per-facility financial signals
async fn get_anomalies(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.analysis.anomalies().clone()))
}

/// GET /api/financials/collisions - License numbers shared by facilities
async fn get_collisions(State(state): State<AppState>) -> impl IntoResponse {
    let collisions: Vec<LicenseCollision> = state.analysis.license_collisions().to_vec();
    Json(ApiResponse::ok(collisions))
}

/// GET /api/financials/unlinked - Audit list of unmatched records
async fn get_unlinked(State(state): State<AppState>) -> impl IntoResponse {
    let records: Vec<FinancialRecord> = state.analysis.get_unlinked_financial_records().to_vec();
    Json(ApiResponse::ok(records))
}

// ============================================================================
// Main Server
// ============================================================================

fn build_analysis() -> anyhow::Result<Analysis> {
    let facilities_path =
        std::env::var("FACILITIES_PATH").unwrap_or_else(|_| "data/facilities.csv".to_string());
    let financials_path =
        std::env::var("FINANCIALS_PATH").unwrap_or_else(|_| "data/financials.csv".to_string());

    let config = match std::env::var("ANALYSIS_CONFIG") {
        Ok(path) => AnalysisConfig::from_file(path)?,
        Err(_) => AnalysisConfig::default(),
    };

    let facilities = load_facilities(&facilities_path)?;
    let financials = load_financials_csv(&financials_path)?;

    Ok(NetworkAnalyzer::new(config).analyze(&facilities, &financials)?)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Facility Network - Web Server");

    let analysis = match build_analysis() {
        Ok(analysis) => analysis,
        Err(e) => {
            error!("Failed to build analysis: {:#}", e);
            eprintln!("   Set FACILITIES_PATH and FINANCIALS_PATH to the input files.");
            std::process::exit(1);
        }
    };
    info!(batch = %analysis.batch_id, "{}", analysis.stats().summary());

    // Create shared state
    let state = AppState {
        analysis: Arc::new(analysis),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/clusters", get(get_clusters))
        .route("/facilities/:id/duplicates", get(get_duplicates))
        .route("/facilities/:id/neighbors", get(get_neighbors))
        .route("/facilities/:id/financials", get(get_financials))
        .route("/groups", get(get_groups))
        .route("/anomalies", get(get_anomalies))
        .route("/financials/collisions", get(get_collisions))
        .route("/financials/unlinked", get(get_unlinked))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server running on http://{}", addr);
    info!("API: http://{}/api/clusters", addr);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
