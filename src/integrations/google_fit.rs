use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::info;

use crate::config::get_settings;
use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::integrations::IntegrationProvider;
use crate::models::entry::HealthEntry;
use crate::models::integration::{DataSource, SyncOutcome};

pub const PROVIDER_NAME: &str = "google_fit";

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const AGGREGATE_ENDPOINT: &str =
    "https://fitness.googleapis.com/fitness/v1/users/me/dataset:aggregate";
const SCOPES: &str = "https://www.googleapis.com/auth/fitness.activity.read https://www.googleapis.com/auth/fitness.body.read";

/// Days of step history pulled on each sync.
const SYNC_WINDOW_DAYS: i64 = 14;

struct OauthConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

fn oauth_config() -> Result<OauthConfig> {
    let settings = get_settings();
    match (
        settings.google_client_id.clone(),
        settings.google_client_secret.clone(),
        settings.google_redirect_uri.clone(),
    ) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(OauthConfig {
            client_id,
            client_secret,
            redirect_uri,
        }),
        _ => Err(AppError::ConfigError(
            "Google Fit is not configured; set GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URI".to_string(),
        )),
    }
}

fn urlencode(value: &str) -> String {
    let mut out = String::new();
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Consent URL the frontend redirects the user to.
pub fn oauth_url(state: &str) -> Result<String> {
    let config = oauth_config()?;
    Ok(format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
        AUTH_ENDPOINT,
        urlencode(&config.client_id),
        urlencode(&config.redirect_uri),
        urlencode(SCOPES),
        urlencode(state),
    ))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

async fn post_token_request(form: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = reqwest::Client::new()
        .post(TOKEN_ENDPOINT)
        .form(form)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::IntegrationError(format!(
            "Google token endpoint returned {}: {}",
            status, body
        )));
    }
    Ok(response.json::<TokenResponse>().await?)
}

/// Exchange the OAuth authorization code and connect the data source.
pub async fn connect(db: &SqliteDatabase, user_id: i64, code: &str) -> Result<DataSource> {
    let config = oauth_config()?;
    let tokens = post_token_request(&[
        ("code", code),
        ("client_id", &config.client_id),
        ("client_secret", &config.client_secret),
        ("redirect_uri", &config.redirect_uri),
        ("grant_type", "authorization_code"),
    ])
    .await?;

    let source = db
        .upsert_data_source(
            user_id,
            PROVIDER_NAME,
            "connected",
            Some(&tokens.access_token),
            tokens.refresh_token.as_deref(),
            tokens.expires_at(),
            None,
        )
        .await?;

    info!(user_id, "google fit connected");
    Ok(source)
}

async fn refresh_access_token(db: &SqliteDatabase, source: &DataSource) -> Result<String> {
    let config = oauth_config()?;
    let refresh_token = source.refresh_token.as_deref().ok_or_else(|| {
        AppError::IntegrationError(
            "Google Fit token expired and no refresh token is stored; reconnect the source"
                .to_string(),
        )
    })?;

    let tokens = post_token_request(&[
        ("refresh_token", refresh_token),
        ("client_id", &config.client_id),
        ("client_secret", &config.client_secret),
        ("grant_type", "refresh_token"),
    ])
    .await?;

    db.update_data_source_tokens(source.id, &tokens.access_token, tokens.expires_at())
        .await?;
    Ok(tokens.access_token)
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    bucket: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    #[serde(rename = "startTimeMillis")]
    start_time_millis: String,
    #[serde(default)]
    dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    point: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    #[serde(default)]
    value: Vec<PointValue>,
}

#[derive(Debug, Deserialize)]
struct PointValue {
    #[serde(rename = "intVal", default)]
    int_val: Option<i64>,
}

/// Daily step totals from the Fitness aggregate API.
async fn fetch_daily_steps(access_token: &str) -> Result<BTreeMap<NaiveDate, i64>> {
    let end = Utc::now();
    let start = end - Duration::days(SYNC_WINDOW_DAYS);
    let body = serde_json::json!({
        "aggregateBy": [{"dataTypeName": "com.google.step_count.delta"}],
        "bucketByTime": {"durationMillis": 86_400_000i64},
        "startTimeMillis": start.timestamp_millis(),
        "endTimeMillis": end.timestamp_millis(),
    });

    let response = reqwest::Client::new()
        .post(AGGREGATE_ENDPOINT)
        .bearer_auth(access_token)
        .json(&body)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(AppError::IntegrationError(format!(
            "Google Fit aggregate returned {}: {}",
            status, text
        )));
    }
    let parsed = response.json::<AggregateResponse>().await?;

    let mut daily = BTreeMap::new();
    for bucket in parsed.bucket {
        let millis: i64 = bucket.start_time_millis.parse().map_err(|_| {
            AppError::IntegrationError("Google Fit bucket has a bad timestamp".to_string())
        })?;
        let Some(start) = Utc.timestamp_millis_opt(millis).single() else {
            continue;
        };
        let steps: i64 = bucket
            .dataset
            .iter()
            .flat_map(|d| &d.point)
            .flat_map(|p| &p.value)
            .filter_map(|v| v.int_val)
            .sum();
        if steps > 0 {
            daily.insert(start.date_naive(), steps);
        }
    }
    Ok(daily)
}

/// Merge fetched step totals into health entries: fill steps on existing
/// rows, create stub rows for days with no entry yet.
pub(crate) async fn apply_daily_steps(
    db: &SqliteDatabase,
    user_id: i64,
    daily: &BTreeMap<NaiveDate, i64>,
) -> Result<(usize, usize)> {
    let mut updated = 0;
    let mut created = 0;
    for (date, steps) in daily {
        match db.get_health_by_date(user_id, *date).await? {
            Some(mut entry) => {
                entry.steps = Some(entry.steps.unwrap_or(0) + steps);
                db.update_health(&entry).await?;
                updated += 1;
            }
            None => {
                db.insert_health(&HealthEntry {
                    id: 0,
                    user_id,
                    recorded_at: Utc::now(),
                    local_date: *date,
                    timezone: "UTC".to_string(),
                    sleep_hours: 0.0,
                    energy_level: 5,
                    wellbeing: 5,
                    supplements: None,
                    weight_kg: None,
                    steps: Some(*steps),
                    heart_rate_avg: None,
                    workout_minutes: None,
                    notes: Some("Imported from Google Fit".to_string()),
                })
                .await?;
                created += 1;
            }
        }
    }
    Ok((updated, created))
}

pub struct GoogleFitProvider;

impl GoogleFitProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GoogleFitProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntegrationProvider for GoogleFitProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn sync(&self, db: &SqliteDatabase, source: &DataSource) -> Result<SyncOutcome> {
        let access_token = match &source.access_token {
            Some(token) if !source.token_expired(Utc::now()) => token.clone(),
            Some(_) => refresh_access_token(db, source).await?,
            None => {
                return Ok(SyncOutcome::failed(
                    "Google Fit source has no access token; reconnect it",
                ))
            }
        };

        let daily = fetch_daily_steps(&access_token).await?;
        if daily.is_empty() {
            return Ok(SyncOutcome::skipped("No step data in the sync window"));
        }

        let (updated, created) = apply_daily_steps(db, source.user_id, &daily).await?;
        Ok(SyncOutcome::success(
            format!("Imported steps for {} days", daily.len()),
            serde_json::json!({
                "days": daily.len(),
                "entries_updated": updated,
                "entries_created": created,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_reserved_chars() {
        assert_eq!(urlencode("a b&c"), "a%20b%26c");
        assert_eq!(urlencode("plain-safe_chars.ok~"), "plain-safe_chars.ok~");
    }

    #[test]
    fn aggregate_response_parses_nested_points() {
        let raw = serde_json::json!({
            "bucket": [{
                "startTimeMillis": "1756080000000",
                "dataset": [{"point": [{"value": [{"intVal": 4200}, {"intVal": 100}]}]}]
            }]
        });
        let parsed: AggregateResponse = serde_json::from_value(raw).unwrap();
        let steps: i64 = parsed.bucket[0]
            .dataset
            .iter()
            .flat_map(|d| &d.point)
            .flat_map(|p| &p.value)
            .filter_map(|v| v.int_val)
            .sum();
        assert_eq!(steps, 4300);
    }

    #[tokio::test]
    async fn steps_merge_into_existing_day_and_create_stub() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        let day_a = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        let day_b = NaiveDate::from_ymd_opt(2026, 8, 21).unwrap();

        db.insert_health(&HealthEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: day_a,
            timezone: "UTC".to_string(),
            sleep_hours: 7.0,
            energy_level: 6,
            wellbeing: 7,
            supplements: None,
            weight_kg: None,
            steps: Some(1000),
            heart_rate_avg: None,
            workout_minutes: None,
            notes: None,
        })
        .await
        .unwrap();

        let mut daily = BTreeMap::new();
        daily.insert(day_a, 2500i64);
        daily.insert(day_b, 8000i64);

        let (updated, created) = apply_daily_steps(&db, 1, &daily).await.unwrap();
        assert_eq!((updated, created), (1, 1));

        let a = db.get_health_by_date(1, day_a).await.unwrap().unwrap();
        assert_eq!(a.steps, Some(3500));
        assert_eq!(a.sleep_hours, 7.0);

        let b = db.get_health_by_date(1, day_b).await.unwrap().unwrap();
        assert_eq!(b.steps, Some(8000));
        assert_eq!(b.energy_level, 5);
    }
}
