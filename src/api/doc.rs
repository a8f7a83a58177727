use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        // System
        crate::api::handlers::health_handler,
        crate::api::handlers::metrics_handler,
        // Apps
        crate::api::handlers::resolve_handler,
        crate::api::handlers::snapshot_handler,
        crate::api::handlers::sales_handler
    ),
    components(
        schemas(
            crate::api::handlers::HealthResponse,
            crate::api::handlers::ErrorResponse,
            crate::api::handlers::CandidatesResponse,
            crate::api::handlers::EndpointSources,
            crate::api::handlers::SnapshotResponse,
            crate::api::handlers::SalesResponse,
            crate::domain::AppOs,
            crate::domain::ResolvedApp,
            crate::domain::RankedCandidate,
            crate::domain::AppMetadata,
            crate::domain::MetadataSnapshot,
            crate::domain::MonthWindow,
            crate::domain::TopCountry,
            crate::domain::OverallMetrics,
            crate::domain::MonthMetrics,
            crate::domain::SalesSummary
        )
    ),
    tags(
        (name = "system", description = "System endpoints for health checks and metrics"),
        (name = "apps", description = "App resolution, metadata snapshots and sales estimates")
    ),
    info(
        title = "App Intelligence Gateway",
        version = "0.1.0",
        description = "Rate-limited, identity-resolving gateway over an app-intelligence API: fuzzy app resolution, metadata snapshots, and aggregated sales/download estimates."
    )
)]
pub struct ApiDoc;
