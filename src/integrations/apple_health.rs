use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::database::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::entry::HealthEntry;

pub const PROVIDER_NAME: &str = "apple_health";

/// Upload cap for `export.xml`; multi-year exports run well past axum's
/// default body limit.
pub const MAX_IMPORT_BYTES: usize = 100 * 1024 * 1024;

const TYPE_STEPS: &str = "HKQuantityTypeIdentifierStepCount";
const TYPE_SLEEP: &str = "HKCategoryTypeIdentifierSleepAnalysis";
const TYPE_HEART_RATE: &str = "HKQuantityTypeIdentifierHeartRate";
const TYPE_BODY_MASS: &str = "HKQuantityTypeIdentifierBodyMass";

/// Summary returned to the caller after an export.xml import.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportStats {
    pub records_parsed: usize,
    pub records_skipped: usize,
    pub days_touched: usize,
    pub entries_created: usize,
    pub entries_updated: usize,
}

#[derive(Debug, Default)]
struct DayAccum {
    steps: i64,
    sleep_minutes: f64,
    heart_rate_sum: f64,
    heart_rate_count: u32,
    weight_kg: Option<f64>,
}

#[derive(Debug)]
struct Record {
    record_type: String,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    value: Option<f64>,
}

// Health export stamps look like "2026-08-01 23:10:00 +0200".
fn parse_export_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn record_from_element(element: &BytesStart<'_>) -> Option<Record> {
    let mut record_type = None;
    let mut start = None;
    let mut end = None;
    let mut value = None;

    for attr in element.attributes().flatten() {
        let raw = String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.as_ref() {
            b"type" => record_type = Some(raw),
            b"startDate" => start = parse_export_date(&raw),
            b"endDate" => end = parse_export_date(&raw),
            b"value" => value = raw.parse::<f64>().ok(),
            _ => {}
        }
    }

    Some(Record {
        record_type: record_type?,
        start: start?,
        end,
        value,
    })
}

fn accumulate(days: &mut BTreeMap<NaiveDate, DayAccum>, record: &Record) -> bool {
    let date = record.start.date_naive();
    match record.record_type.as_str() {
        TYPE_STEPS => {
            let Some(value) = record.value else { return false };
            days.entry(date).or_default().steps += value as i64;
        }
        TYPE_SLEEP => {
            let Some(end) = record.end else { return false };
            let minutes = (end - record.start).num_seconds() as f64 / 60.0;
            if minutes <= 0.0 {
                return false;
            }
            days.entry(date).or_default().sleep_minutes += minutes;
        }
        TYPE_HEART_RATE => {
            let Some(value) = record.value else { return false };
            let day = days.entry(date).or_default();
            day.heart_rate_sum += value;
            day.heart_rate_count += 1;
        }
        TYPE_BODY_MASS => {
            let Some(value) = record.value else { return false };
            // Last reading of the day wins.
            days.entry(date).or_default().weight_kg = Some(value);
        }
        _ => return false,
    }
    true
}

fn parse_export(xml: &str) -> Result<(BTreeMap<NaiveDate, DayAccum>, usize, usize)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut days: BTreeMap<NaiveDate, DayAccum> = BTreeMap::new();
    let mut parsed = 0;
    let mut skipped = 0;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"Record" => {
                match record_from_element(&e) {
                    Some(record) if accumulate(&mut days, &record) => parsed += 1,
                    _ => skipped += 1,
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::ValidationError(format!(
                    "Malformed Apple Health export: {}",
                    e
                )))
            }
        }
        buf.clear();
    }

    Ok((days, parsed, skipped))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Import an Apple Health `export.xml` payload into health entries.
/// Steps add onto existing rows, sleep keeps the larger reading, heart
/// rate averages, weight takes the latest value.
pub async fn import_export_xml(
    db: &SqliteDatabase,
    user_id: i64,
    xml: &str,
) -> Result<ImportStats> {
    let (days, records_parsed, records_skipped) = parse_export(xml)?;
    if days.is_empty() {
        return Err(AppError::ValidationError(
            "No usable health records found in the export".to_string(),
        ));
    }

    let mut entries_created = 0;
    let mut entries_updated = 0;

    for (date, accum) in &days {
        let sleep_hours = round1(accum.sleep_minutes / 60.0);
        let heart_rate_avg = (accum.heart_rate_count > 0)
            .then(|| (accum.heart_rate_sum / accum.heart_rate_count as f64).round() as i64);

        match db.get_health_by_date(user_id, *date).await? {
            Some(mut entry) => {
                if accum.steps > 0 {
                    entry.steps = Some(entry.steps.unwrap_or(0) + accum.steps);
                }
                if sleep_hours > entry.sleep_hours {
                    entry.sleep_hours = sleep_hours;
                }
                if let Some(hr) = heart_rate_avg {
                    entry.heart_rate_avg = Some(hr);
                }
                if let Some(weight) = accum.weight_kg {
                    entry.weight_kg = Some(weight);
                }
                db.update_health(&entry).await?;
                entries_updated += 1;
            }
            None => {
                db.insert_health(&HealthEntry {
                    id: 0,
                    user_id,
                    recorded_at: Utc::now(),
                    local_date: *date,
                    timezone: "UTC".to_string(),
                    sleep_hours,
                    energy_level: 5,
                    wellbeing: 5,
                    supplements: None,
                    weight_kg: accum.weight_kg,
                    steps: (accum.steps > 0).then_some(accum.steps),
                    heart_rate_avg,
                    workout_minutes: None,
                    notes: Some("Imported from Apple Health".to_string()),
                })
                .await?;
                entries_created += 1;
            }
        }
    }

    info!(
        user_id,
        days = days.len(),
        records_parsed,
        "apple health import finished"
    );

    Ok(ImportStats {
        records_parsed,
        records_skipped,
        days_touched: days.len(),
        entries_created,
        entries_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<HealthData locale="en_US">
  <Record type="HKQuantityTypeIdentifierStepCount" startDate="2026-08-20 09:00:00 +0000" endDate="2026-08-20 10:00:00 +0000" value="4200"/>
  <Record type="HKQuantityTypeIdentifierStepCount" startDate="2026-08-20 14:00:00 +0000" endDate="2026-08-20 15:00:00 +0000" value="1800"/>
  <Record type="HKCategoryTypeIdentifierSleepAnalysis" startDate="2026-08-20 23:00:00 +0000" endDate="2026-08-21 06:30:00 +0000" value="HKCategoryValueSleepAnalysisAsleep"/>
  <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2026-08-20 09:30:00 +0000" endDate="2026-08-20 09:30:00 +0000" value="62"/>
  <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2026-08-20 18:00:00 +0000" endDate="2026-08-20 18:00:00 +0000" value="78"/>
  <Record type="HKQuantityTypeIdentifierBodyMass" startDate="2026-08-20 08:00:00 +0000" endDate="2026-08-20 08:00:00 +0000" value="81.4"/>
  <Record type="HKQuantityTypeIdentifierDistanceWalkingRunning" startDate="2026-08-20 09:00:00 +0000" endDate="2026-08-20 10:00:00 +0000" value="3.1"/>
</HealthData>"#;

    #[test]
    fn export_parsing_aggregates_per_day() {
        let (days, parsed, skipped) = parse_export(SAMPLE).unwrap();
        assert_eq!(parsed, 6);
        assert_eq!(skipped, 1); // distance record type is ignored

        let day = days.get(&NaiveDate::from_ymd_opt(2026, 8, 20).unwrap()).unwrap();
        assert_eq!(day.steps, 6000);
        assert_eq!(day.sleep_minutes, 450.0);
        assert_eq!(day.heart_rate_count, 2);
        assert_eq!(day.weight_kg, Some(81.4));
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(parse_export("<HealthData><Record").is_err());
    }

    #[tokio::test]
    async fn import_creates_and_merges_entries() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();

        db.insert_health(&HealthEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: day,
            timezone: "UTC".to_string(),
            sleep_hours: 8.5,
            energy_level: 7,
            wellbeing: 8,
            supplements: None,
            weight_kg: None,
            steps: Some(500),
            heart_rate_avg: None,
            workout_minutes: None,
            notes: None,
        })
        .await
        .unwrap();

        let stats = import_export_xml(&db, 1, SAMPLE).await.unwrap();
        assert_eq!(stats.entries_updated, 1);
        assert_eq!(stats.entries_created, 0);
        assert_eq!(stats.days_touched, 1);

        let entry = db.get_health_by_date(1, day).await.unwrap().unwrap();
        assert_eq!(entry.steps, Some(6500));
        // Manual 8.5h beats the exported 7.5h, so it is kept.
        assert_eq!(entry.sleep_hours, 8.5);
        assert_eq!(entry.heart_rate_avg, Some(70));
        assert_eq!(entry.weight_kg, Some(81.4));
    }

    #[tokio::test]
    async fn empty_export_is_an_error() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let err = import_export_xml(&db, 1, "<HealthData></HealthData>")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
