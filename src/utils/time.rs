use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::errors::{AppError, Result};

/// Normalized timestamp for one entry: the UTC instant, the calendar
/// date in the entry's zone, and the zone name that was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTimestamp {
    pub recorded_at: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub timezone: String,
}

/// Resolve `recorded_at` and a timezone name into a normalized timestamp.
///
/// A missing `recorded_at` means "now". The local calendar date is always
/// derived in the requested zone (UTC when none is given); unknown IANA
/// names are rejected.
pub fn normalize_timestamp(
    recorded_at: Option<DateTime<Utc>>,
    timezone_name: Option<&str>,
) -> Result<NormalizedTimestamp> {
    let tz: Option<Tz> = match timezone_name {
        Some(name) => Some(name.parse::<Tz>().map_err(|_| {
            AppError::ValidationError(format!("Invalid timezone '{}'", name))
        })?),
        None => None,
    };

    let recorded_at = recorded_at.unwrap_or_else(Utc::now);

    let local_date = match tz {
        Some(tz) => tz.from_utc_datetime(&recorded_at.naive_utc()).date_naive(),
        None => recorded_at.date_naive(),
    };

    let tz_name = timezone_name.unwrap_or("UTC").to_string();

    Ok(NormalizedTimestamp {
        recorded_at,
        local_date,
        timezone: tz_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_unknown_zone() {
        let err = normalize_timestamp(None, Some("Mars/Olympus"));
        assert!(err.is_err());
    }

    #[test]
    fn utc_when_zone_missing() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let norm = normalize_timestamp(Some(at), None).unwrap();
        assert_eq!(norm.timezone, "UTC");
        assert_eq!(norm.local_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn local_date_crosses_midnight_east_of_utc() {
        // 23:30 UTC is already the next day in Tokyo.
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let norm = normalize_timestamp(Some(at), Some("Asia/Tokyo")).unwrap();
        assert_eq!(norm.local_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(norm.recorded_at, at);
    }

    #[test]
    fn local_date_lags_west_of_utc() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap();
        let norm = normalize_timestamp(Some(at), Some("America/Los_Angeles")).unwrap();
        assert_eq!(norm.local_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }
}
