use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::get_settings;
use crate::database::{SqliteDatabase, GLOBAL_DB};
use crate::errors::{AppError, Result};
use crate::utils::middleware::{global_rate_limiter, request_id_middleware};

pub mod routes;
pub mod types;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::update_profile,
        routes::auth::change_password,
        routes::auth::forgot_password,
        routes::auth::reset_password,
        routes::entries::create_health,
        routes::entries::list_health,
        routes::entries::get_health,
        routes::entries::update_health,
        routes::entries::delete_health,
        routes::entries::create_finance,
        routes::entries::list_finance,
        routes::entries::get_finance,
        routes::entries::update_finance,
        routes::entries::delete_finance,
        routes::entries::create_productivity,
        routes::entries::list_productivity,
        routes::entries::get_productivity,
        routes::entries::update_productivity,
        routes::entries::delete_productivity,
        routes::entries::create_learning,
        routes::entries::list_learning,
        routes::entries::get_learning,
        routes::entries::update_learning,
        routes::entries::delete_learning,
        routes::analytics::correlations,
        routes::analytics::insights,
        routes::analytics::recommendations,
        routes::analytics::weekday_trends,
        routes::analytics::monthly,
        routes::analytics::weekly_digest,
        routes::analytics::insight_of_week,
        routes::goals::create,
        routes::goals::list,
        routes::goals::progress,
        routes::goals::get_one,
        routes::goals::update,
        routes::goals::delete,
        routes::integrations::list_sources,
        routes::integrations::google_fit_authorize,
        routes::integrations::google_fit_connect,
        routes::integrations::open_banking_connect,
        routes::integrations::apple_health_import,
        routes::integrations::trigger_sync,
        routes::integrations::source_status,
        routes::integrations::list_jobs,
        routes::integrations::get_job,
        routes::integrations::disconnect,
        routes::export::export,
        routes::admin::list_users,
        routes::admin::set_role,
        routes::admin::trigger_etl,
    ),
    components(schemas(
        types::RegisterRequest,
        types::LoginRequest,
        types::TokenResponse,
        types::UpdateProfileRequest,
        types::ChangePasswordRequest,
        types::ForgotPasswordRequest,
        types::ResetPasswordRequest,
        types::SetRoleRequest,
        types::MessageResponse,
        types::HealthEntryPayload,
        types::FinanceEntryPayload,
        types::ProductivityEntryPayload,
        types::LearningEntryPayload,
        types::GoalPayload,
        types::GoogleFitConnectRequest,
        types::OauthUrlResponse,
        crate::models::user::UserResponse,
        crate::models::entry::Sphere,
        crate::models::entry::HealthEntry,
        crate::models::entry::FinanceEntry,
        crate::models::entry::ProductivityEntry,
        crate::models::entry::LearningEntry,
        crate::models::goal::UserGoal,
        crate::models::goal::GoalProgress,
        crate::models::integration::DataSource,
        crate::models::integration::SyncJob,
        crate::integrations::apple_health::ImportStats,
        crate::services::analytics::CorrelationPair,
        crate::services::analytics::Insight,
        crate::services::analytics::WeekdayStat,
        crate::services::analytics::TrendStat,
        crate::services::analytics::WeekdayTrends,
        crate::services::analytics::MonthMetric,
        crate::services::analytics::SphereSummary,
        crate::services::recommender::Recommendation,
        crate::etl::EtlReport,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login and account management"),
        (name = "entries", description = "Daily entries across the four life spheres"),
        (name = "analytics", description = "Correlations, insights and trends"),
        (name = "goals", description = "Personal goals and progress"),
        (name = "integrations", description = "External data providers"),
        (name = "export", description = "CSV export"),
        (name = "admin", description = "Administrative operations"),
    ),
    info(
        title = "Lifedash API",
        description = "Personal life dashboard: daily tracking, analytics and integrations"
    )
)]
pub struct ApiDoc;

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}

fn cors_layer() -> CorsLayer {
    let settings = get_settings();
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    if settings.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = settings
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}

pub fn build_router() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", routes::auth::router())
        .nest("/api/entries", routes::entries::router())
        .nest("/api/analytics", routes::analytics::router())
        .nest("/api/goals", routes::goals::router())
        .nest("/api/integrations", routes::integrations::router())
        .nest("/api/export", routes::export::router())
        .nest("/api/admin", routes::admin::router())
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(global_rate_limiter))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(cors_layer())
}

pub async fn start_http_server() -> Result<()> {
    let settings = get_settings();

    let database = Arc::new(SqliteDatabase::new(&settings.database_path).await?);
    GLOBAL_DB
        .set(database)
        .map_err(|_| AppError::InternalError("Database already initialized".to_string()))?;

    let app = build_router();
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to bind {}: {}", addr, e)))?;

    info!(%addr, "http server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::InternalError(format!("Server error: {}", e)))?;

    Ok(())
}
