use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};

use crate::api::routes::{db, AuthBearer};
use crate::errors::Result;
use crate::services::analytics::{
    build_daily_frame, compute_correlations, generate_insights, sphere_summary, trend_this_month,
    weekday_and_trends,
};
use crate::services::cache;
use crate::services::goals::goal_progress_for_user;
use crate::services::recommender::generate_recommendations;

pub fn router() -> Router {
    Router::new()
        .route("/correlations", get(correlations))
        .route("/insights", get(insights))
        .route("/recommendations", get(recommendations))
        .route("/weekday-trends", get(weekday_trends))
        .route("/monthly", get(monthly))
        .route("/weekly-digest", get(weekly_digest))
        .route("/insight-of-week", get(insight_of_week))
}

pub(crate) async fn cached_or_compute<F>(
    endpoint: &str,
    user_id: i64,
    compute: F,
) -> Result<Json<serde_json::Value>>
where
    F: std::future::Future<Output = Result<serde_json::Value>>,
{
    let key = cache::cache_key(endpoint, user_id);
    if let Some(hit) = cache::get_json(&key) {
        return Ok(Json(hit));
    }
    let payload = compute.await?;
    cache::set_json(&key, payload.clone());
    Ok(Json(payload))
}

#[utoipa::path(
    get,
    path = "/api/analytics/correlations",
    responses((status = 200, description = "Cross-metric Pearson correlations, strongest first"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn correlations(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("correlations", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;
        let pairs = compute_correlations(&frame);
        Ok(serde_json::json!({ "correlations": pairs, "days": frame.len() }))
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/analytics/insights",
    responses((status = 200, description = "Up to four templated insights"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn insights(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("insights", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;
        Ok(serde_json::json!({ "insights": generate_insights(&frame) }))
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/analytics/recommendations",
    responses((status = 200, description = "Up to five goal-aware recommendations"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn recommendations(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("recommendations", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;
        let progress = goal_progress_for_user(&db, auth.user_id, "7d").await?;
        Ok(serde_json::json!({
            "recommendations": generate_recommendations(&frame, &progress)
        }))
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/analytics/weekday-trends",
    responses((status = 200, description = "Best/worst weekdays plus 14- and 30-day linear trends"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn weekday_trends(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("weekday_trends", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;
        Ok(serde_json::to_value(weekday_and_trends(&frame))?)
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/analytics/monthly",
    responses((status = 200, description = "Key metrics this month versus the previous one"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn monthly(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("monthly", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;
        let metrics = trend_this_month(&frame, Utc::now().date_naive());
        Ok(serde_json::json!({ "metrics": metrics }))
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/analytics/weekly-digest",
    responses((status = 200, description = "Per-sphere rollup of the trailing week with insights"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn weekly_digest(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("weekly_digest", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;

        let period_end = Utc::now().date_naive();
        let period_start = period_end - Duration::days(6);
        let week = frame.restrict(period_start, period_end);

        let mut insights = generate_insights(&week);
        if insights.is_empty() {
            insights = generate_insights(&frame);
        }
        let progress = goal_progress_for_user(&db, auth.user_id, "7d").await?;
        let recommendations = generate_recommendations(&frame, &progress);

        Ok(serde_json::json!({
            "period_start": period_start.format("%Y-%m-%d").to_string(),
            "period_end": period_end.format("%Y-%m-%d").to_string(),
            "days_with_data": week.len(),
            "summary": sphere_summary(&week),
            "insights": insights,
            "recommendations": recommendations,
        }))
    })
    .await
}

#[utoipa::path(
    get,
    path = "/api/analytics/insight-of-week",
    responses((status = 200, description = "Single headline insight for the week"), (status = 401)),
    security(("bearer" = [])),
    tag = "analytics"
)]
pub(crate) async fn insight_of_week(AuthBearer(auth): AuthBearer) -> Result<Json<serde_json::Value>> {
    cached_or_compute("insight_of_week", auth.user_id, async {
        let db = db()?;
        let frame = build_daily_frame(&db, auth.user_id).await?;

        let headline = generate_insights(&frame)
            .into_iter()
            .next()
            .map(|i| i.message);
        let headline = match headline {
            Some(message) => message,
            None => {
                let progress = goal_progress_for_user(&db, auth.user_id, "7d").await?;
                generate_recommendations(&frame, &progress)
                    .into_iter()
                    .next()
                    .map(|r| r.message)
                    .unwrap_or_else(|| {
                        "Start logging daily entries to see your first insight.".to_string()
                    })
            }
        };

        Ok(serde_json::json!({ "insight": headline }))
    })
    .await
}
