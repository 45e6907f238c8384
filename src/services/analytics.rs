use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;

use crate::database::entries::EntryFilter;
use crate::database::SqliteDatabase;
use crate::errors::Result;

pub const MIN_CORRELATION_SAMPLES: usize = 5;
pub const MIN_CORRELATION_ABS: f64 = 0.3;
pub const MAX_CORRELATION_ITEMS: usize = 12;
pub const MAX_INSIGHTS: usize = 4;

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agg {
    Mean,
    Sum,
}

/// Metric columns of the daily frame, in a fixed order. Same-day
/// duplicates collapse by mean for level-style metrics and by sum for
/// count/amount-style ones.
const METRICS: [(&str, Agg); 16] = [
    ("sleep_hours", Agg::Mean),
    ("energy_level", Agg::Mean),
    ("weight_kg", Agg::Mean),
    ("wellbeing", Agg::Mean),
    ("steps", Agg::Sum),
    ("heart_rate_avg", Agg::Mean),
    ("workout_minutes", Agg::Sum),
    ("income", Agg::Sum),
    ("expense_food", Agg::Sum),
    ("expense_transport", Agg::Sum),
    ("expense_health", Agg::Sum),
    ("expense_other", Agg::Sum),
    ("deep_work_hours", Agg::Sum),
    ("tasks_completed", Agg::Sum),
    ("focus_level", Agg::Mean),
    ("study_hours", Agg::Sum),
];

const EXPENSE_COLUMNS: [&str; 4] = [
    "expense_food",
    "expense_transport",
    "expense_health",
    "expense_other",
];

/// One user's entries outer-joined on local date: a tiny column store,
/// rows sorted by date ascending.
#[derive(Debug, Clone, Default)]
pub struct DailyFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<(String, Vec<Option<f64>>)>,
}

#[derive(Default, Clone, Copy)]
struct Accum {
    sum: f64,
    count: u32,
}

#[derive(Default)]
struct FrameBuilder {
    // (date, metric index) -> accumulator
    cells: BTreeMap<NaiveDate, [Option<Accum>; METRICS.len()]>,
}

impl FrameBuilder {
    fn add(&mut self, date: NaiveDate, metric: &str, value: f64) {
        let Some(idx) = METRICS.iter().position(|(name, _)| *name == metric) else {
            return;
        };
        let row = self.cells.entry(date).or_default();
        let accum = row[idx].get_or_insert(Accum::default());
        accum.sum += value;
        accum.count += 1;
    }

    fn add_opt(&mut self, date: NaiveDate, metric: &str, value: Option<f64>) {
        if let Some(value) = value {
            self.add(date, metric, value);
        }
    }

    fn finish(self) -> DailyFrame {
        let dates: Vec<NaiveDate> = self.cells.keys().copied().collect();
        let mut columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        for (idx, (name, agg)) in METRICS.iter().enumerate() {
            let values: Vec<Option<f64>> = self
                .cells
                .values()
                .map(|row| {
                    row[idx].map(|a| match agg {
                        Agg::Sum => a.sum,
                        Agg::Mean => a.sum / a.count as f64,
                    })
                })
                .collect();
            if values.iter().any(|v| v.is_some()) {
                columns.push((name.to_string(), values));
            }
        }
        DailyFrame { dates, columns }
    }
}

impl DailyFrame {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Rows where both columns have a value.
    pub fn pairs(&self, a: &str, b: &str) -> Vec<(f64, f64)> {
        let (Some(col_a), Some(col_b)) = (self.column(a), self.column(b)) else {
            return Vec::new();
        };
        col_a
            .iter()
            .zip(col_b)
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .collect()
    }

    /// (date, value) points for one column, skipping gaps.
    pub fn series(&self, name: &str) -> Vec<(NaiveDate, f64)> {
        let Some(col) = self.column(name) else {
            return Vec::new();
        };
        self.dates
            .iter()
            .zip(col)
            .filter_map(|(d, v)| Some((*d, (*v)?)))
            .collect()
    }

    /// Per-row total of the expense columns; None when no expense column
    /// has a value for that row.
    pub fn total_expense(&self) -> Vec<Option<f64>> {
        let cols: Vec<&[Option<f64>]> = EXPENSE_COLUMNS
            .iter()
            .filter_map(|name| self.column(name))
            .collect();
        (0..self.len())
            .map(|i| {
                let mut total = 0.0;
                let mut seen = false;
                for col in &cols {
                    if let Some(v) = col[i] {
                        total += v;
                        seen = true;
                    }
                }
                seen.then_some(total)
            })
            .collect()
    }

    /// Restrict to rows within an inclusive date range.
    pub fn restrict(&self, start: NaiveDate, end: NaiveDate) -> DailyFrame {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect();
        DailyFrame {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, values)| {
                    (name.clone(), keep.iter().map(|&i| values[i]).collect())
                })
                .collect(),
        }
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from("date");
        for name in self.column_names() {
            out.push(',');
            out.push_str(name);
        }
        out.push('\n');
        for (i, date) in self.dates.iter().enumerate() {
            out.push_str(&date.format("%Y-%m-%d").to_string());
            for (_, values) in &self.columns {
                out.push(',');
                if let Some(v) = values[i] {
                    out.push_str(&format_number(v));
                }
            }
            out.push('\n');
        }
        out
    }
}

fn format_number(v: f64) -> String {
    if (v - v.round()).abs() < 1e-9 {
        format!("{}", v.round() as i64)
    } else {
        format!("{}", v)
    }
}

/// Build the per-user daily frame by outer-joining the four entry tables
/// on local date.
pub async fn build_daily_frame(db: &SqliteDatabase, user_id: i64) -> Result<DailyFrame> {
    let filter = EntryFilter::range(None, None);
    let mut builder = FrameBuilder::default();

    for e in db.list_health(user_id, filter).await? {
        builder.add(e.local_date, "sleep_hours", e.sleep_hours);
        builder.add(e.local_date, "energy_level", e.energy_level as f64);
        builder.add(e.local_date, "wellbeing", e.wellbeing as f64);
        builder.add_opt(e.local_date, "weight_kg", e.weight_kg);
        builder.add_opt(e.local_date, "steps", e.steps.map(|v| v as f64));
        builder.add_opt(e.local_date, "heart_rate_avg", e.heart_rate_avg.map(|v| v as f64));
        builder.add_opt(e.local_date, "workout_minutes", e.workout_minutes.map(|v| v as f64));
    }
    for e in db.list_finance(user_id, filter).await? {
        builder.add(e.local_date, "income", e.income);
        builder.add(e.local_date, "expense_food", e.expense_food);
        builder.add(e.local_date, "expense_transport", e.expense_transport);
        builder.add(e.local_date, "expense_health", e.expense_health);
        builder.add(e.local_date, "expense_other", e.expense_other);
    }
    for e in db.list_productivity(user_id, filter).await? {
        builder.add(e.local_date, "deep_work_hours", e.deep_work_hours);
        builder.add(e.local_date, "tasks_completed", e.tasks_completed as f64);
        builder.add(e.local_date, "focus_level", e.focus_level as f64);
    }
    for e in db.list_learning(user_id, filter).await? {
        builder.add(e.local_date, "study_hours", e.study_hours);
    }

    Ok(builder.finish())
}

// --- small stats helpers ---

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Pearson correlation; None when either side has no variance.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in pairs {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// Least-squares slope of y over x.
fn regression_slope(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut vx = 0.0;
    for (x, y) in pairs {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
    }
    if vx <= 0.0 {
        return None;
    }
    Some(cov / vx)
}

/// Slope over an index axis 0..n.
fn index_slope(values: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, *v))
        .collect();
    regression_slope(&pairs)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

// --- correlations ---

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CorrelationPair {
    pub metric_a: String,
    pub metric_b: String,
    pub correlation: f64,
    pub sample_size: usize,
}

pub fn compute_correlations(frame: &DailyFrame) -> Vec<CorrelationPair> {
    if frame.len() < MIN_CORRELATION_SAMPLES {
        return Vec::new();
    }

    let names: Vec<&str> = frame.column_names().collect();
    let mut out = Vec::new();
    for (i, a) in names.iter().enumerate() {
        for b in names.iter().skip(i + 1) {
            let pairs = frame.pairs(a, b);
            if pairs.len() < MIN_CORRELATION_SAMPLES {
                continue;
            }
            let Some(r) = pearson(&pairs) else { continue };
            if r.abs() < MIN_CORRELATION_ABS {
                continue;
            }
            out.push(CorrelationPair {
                metric_a: a.to_string(),
                metric_b: b.to_string(),
                correlation: round_to(r, 3),
                sample_size: pairs.len(),
            });
        }
    }

    out.sort_by(|a, b| {
        b.correlation
            .abs()
            .partial_cmp(&a.correlation.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out.truncate(MAX_CORRELATION_ITEMS);
    out
}

// --- insights ---

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Insight {
    pub message: String,
    pub severity: String,
}

impl Insight {
    fn info(message: String) -> Self {
        Self {
            message,
            severity: "info".to_string(),
        }
    }
}

fn sleep_vs_productivity_insight(frame: &DailyFrame) -> Option<String> {
    let pairs = frame.pairs("sleep_hours", "deep_work_hours");
    if pairs.len() < 6 {
        return None;
    }
    let low: Vec<f64> = pairs.iter().filter(|(s, _)| *s < 6.0).map(|(_, d)| *d).collect();
    let high: Vec<f64> = pairs.iter().filter(|(s, _)| *s >= 7.0).map(|(_, d)| *d).collect();
    if low.len() < 3 || high.len() < 3 {
        return None;
    }
    let avg_low = mean(&low)?;
    let avg_high = mean(&high)?;
    if avg_high <= 0.0 {
        return None;
    }
    let drop_pct = (1.0 - avg_low / avg_high) * 100.0;
    if drop_pct < 15.0 {
        return None;
    }
    Some(format!(
        "When you sleep under 6h, deep work drops by {:.0}% compared to 7h+.",
        drop_pct
    ))
}

fn sleep_energy_trend_insight(frame: &DailyFrame) -> Option<String> {
    let pairs = frame.pairs("sleep_hours", "energy_level");
    if pairs.len() < 6 {
        return None;
    }
    let slope = regression_slope(&pairs)?;
    if slope > 0.25 {
        return Some(format!(
            "Energy rises with more sleep (linear trend detected). +{:.2} energy per extra hour.",
            slope
        ));
    }
    None
}

fn finance_wellbeing_insight(frame: &DailyFrame) -> Option<String> {
    let pairs = frame.pairs("expense_food", "wellbeing");
    if pairs.len() < 6 {
        return None;
    }
    let corr = pearson(&pairs)?;
    if corr < -0.35 {
        return Some(format!(
            "Food spending tends to align with lower wellbeing (r={:.2}).",
            corr
        ));
    }
    None
}

fn expenses_vs_income_trend_insight(frame: &DailyFrame) -> Option<String> {
    let income = frame.column("income")?;
    let totals = frame.total_expense();

    let mut sample: Vec<(f64, f64)> = income
        .iter()
        .zip(&totals)
        .filter_map(|(inc, tot)| Some(((*inc)?, (*tot)?)))
        .collect();
    if sample.len() < 10 {
        return None;
    }
    if sample.len() > 30 {
        sample = sample.split_off(sample.len() - 30);
    }
    let inc_slope = index_slope(&sample.iter().map(|p| p.0).collect::<Vec<_>>())?;
    let exp_slope = index_slope(&sample.iter().map(|p| p.1).collect::<Vec<_>>())?;
    if inc_slope <= 0.0 || exp_slope <= inc_slope {
        return None;
    }
    let pct = (exp_slope / inc_slope - 1.0) * 100.0;
    Some(format!(
        "Expenses are growing faster than income over the last 30 days (expenses trend ~{:.0}% steeper).",
        pct
    ))
}

fn sleep_after_weekend_insight(frame: &DailyFrame) -> Option<String> {
    let series = frame.series("sleep_hours");
    let monday: Vec<f64> = series
        .iter()
        .filter(|(d, _)| d.weekday().num_days_from_monday() == 0)
        .map(|(_, v)| *v)
        .collect();
    let other: Vec<f64> = series
        .iter()
        .filter(|(d, _)| d.weekday().num_days_from_monday() != 0)
        .map(|(_, v)| *v)
        .collect();
    if monday.len() < 3 || other.len() < 10 {
        return None;
    }
    let mon_avg = mean(&monday)?;
    let other_avg = mean(&other)?;
    if mon_avg >= other_avg - 0.2 {
        return None;
    }
    let diff = other_avg - mon_avg;
    Some(format!(
        "Sleep is worse after weekends: Monday avg {:.1}h vs {:.1}h on other days (-{:.1}h).",
        mon_avg, other_avg, diff
    ))
}

fn focus_higher_with_sleep_insight(frame: &DailyFrame) -> Option<String> {
    let pairs = frame.pairs("sleep_hours", "focus_level");
    let low: Vec<f64> = pairs.iter().filter(|(s, _)| *s < 6.0).map(|(_, f)| *f).collect();
    let high: Vec<f64> = pairs.iter().filter(|(s, _)| *s >= 6.0).map(|(_, f)| *f).collect();
    if low.len() < 3 || high.len() < 3 {
        return None;
    }
    let f_low = mean(&low)?;
    let f_high = mean(&high)?;
    if f_high <= f_low + 0.3 {
        return None;
    }
    Some(format!(
        "Focus is higher on days with >=6h sleep: {:.1} vs {:.1} on days with less sleep.",
        f_high, f_low
    ))
}

pub fn generate_insights(frame: &DailyFrame) -> Vec<Insight> {
    let candidates: [fn(&DailyFrame) -> Option<String>; 6] = [
        sleep_vs_productivity_insight,
        sleep_energy_trend_insight,
        finance_wellbeing_insight,
        expenses_vs_income_trend_insight,
        sleep_after_weekend_insight,
        focus_higher_with_sleep_insight,
    ];

    let mut insights = Vec::new();
    for candidate in candidates {
        if let Some(message) = candidate(frame) {
            insights.push(Insight::info(message));
        }
        if insights.len() >= MAX_INSIGHTS {
            break;
        }
    }

    if insights.is_empty() && !frame.is_empty() {
        insights.push(Insight::info(
            "Keep tracking daily inputs to unlock insights.".to_string(),
        ));
    }

    insights
}

// --- weekday aggregates and trends ---

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeekdayStat {
    pub metric: String,
    pub best_weekday: String,
    pub worst_weekday: String,
    pub best_value: f64,
    pub worst_value: f64,
}

pub fn best_worst_weekday(
    frame: &DailyFrame,
    metric: &str,
    higher_is_better: bool,
) -> Option<WeekdayStat> {
    const MIN_DAYS_PER_WEEKDAY: usize = 2;

    let series = frame.series(metric);
    if series.len() < 7 {
        return None;
    }

    let mut buckets: [Vec<f64>; 7] = Default::default();
    for (date, value) in &series {
        buckets[date.weekday().num_days_from_monday() as usize].push(*value);
    }

    let averages: Vec<(usize, f64)> = buckets
        .iter()
        .enumerate()
        .filter(|(_, vals)| vals.len() >= MIN_DAYS_PER_WEEKDAY)
        .filter_map(|(i, vals)| mean(vals).map(|m| (i, m)))
        .collect();
    if averages.len() < 2 {
        return None;
    }

    let max = averages
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let min = averages
        .iter()
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let (best, worst) = if higher_is_better { (max, min) } else { (min, max) };

    Some(WeekdayStat {
        metric: metric.to_string(),
        best_weekday: WEEKDAY_NAMES[best.0].to_string(),
        worst_weekday: WEEKDAY_NAMES[worst.0].to_string(),
        best_value: round_to(best.1, 2),
        worst_value: round_to(worst.1, 2),
    })
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrendStat {
    pub metric: String,
    pub slope: f64,
    pub direction: String,
    pub days: usize,
}

fn trend_from_values(metric: &str, values: &[f64], days: usize) -> Option<TrendStat> {
    const MIN_POINTS: usize = 5;
    if values.len() < MIN_POINTS {
        return None;
    }
    if values.iter().all(|v| *v == values[0]) {
        return Some(TrendStat {
            metric: metric.to_string(),
            slope: 0.0,
            direction: "neutral".to_string(),
            days,
        });
    }
    let slope = index_slope(values)?;
    let direction = if slope.abs() < 1e-6 {
        "neutral"
    } else if slope > 0.0 {
        "up"
    } else {
        "down"
    };
    Some(TrendStat {
        metric: metric.to_string(),
        slope: round_to(slope, 4),
        direction: direction.to_string(),
        days,
    })
}

/// Linear trend over the last `days` recorded points of a metric.
pub fn linear_trend(frame: &DailyFrame, metric: &str, days: usize) -> Option<TrendStat> {
    let series = frame.series(metric);
    let tail: Vec<f64> = series
        .iter()
        .skip(series.len().saturating_sub(days))
        .map(|(_, v)| *v)
        .collect();
    trend_from_values(metric, &tail, days)
}

fn total_expense_trend(frame: &DailyFrame, days: usize) -> Option<TrendStat> {
    let totals: Vec<f64> = frame.total_expense().into_iter().flatten().collect();
    let tail: Vec<f64> = totals
        .iter()
        .skip(totals.len().saturating_sub(days))
        .copied()
        .collect();
    trend_from_values("total_expense", &tail, days)
}

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct WeekdayTrends {
    pub best_worst_weekday: Vec<WeekdayStat>,
    pub trends_14: Vec<TrendStat>,
    pub trends_30: Vec<TrendStat>,
}

pub fn weekday_and_trends(frame: &DailyFrame) -> WeekdayTrends {
    let mut payload = WeekdayTrends::default();

    for (metric, higher) in [
        ("sleep_hours", true),
        ("deep_work_hours", true),
        ("weight_kg", false),
    ] {
        if let Some(stat) = best_worst_weekday(frame, metric, higher) {
            payload.best_worst_weekday.push(stat);
        }
    }

    for metric in ["sleep_hours", "deep_work_hours", "weight_kg", "income"] {
        if let Some(t) = linear_trend(frame, metric, 14) {
            payload.trends_14.push(t);
        }
        if let Some(t) = linear_trend(frame, metric, 30) {
            payload.trends_30.push(t);
        }
    }
    if let Some(t) = total_expense_trend(frame, 14) {
        payload.trends_14.push(t);
    }
    if let Some(t) = total_expense_trend(frame, 30) {
        payload.trends_30.push(t);
    }

    payload
}

// --- month over month ---

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonthMetric {
    pub metric: String,
    pub label: String,
    pub value: f64,
    pub direction: String,
}

fn direction(current: f64, previous: f64, higher_is_better: bool) -> String {
    let dir = if current > previous {
        "up"
    } else if current < previous {
        "down"
    } else {
        "neutral"
    };
    // For weight the reported direction tracks the movement itself; the
    // caller decides what counts as good.
    let _ = higher_is_better;
    dir.to_string()
}

/// Compare key metrics for this month against the previous month.
pub fn trend_this_month(frame: &DailyFrame, today: NaiveDate) -> Vec<MonthMetric> {
    if frame.is_empty() {
        return Vec::new();
    }

    let this_start = today.with_day(1).unwrap_or(today);
    let prev_end = this_start.pred_opt().unwrap_or(this_start);
    let prev_start = prev_end.with_day(1).unwrap_or(prev_end);

    let this_frame = frame.restrict(this_start, today);
    let prev_frame = frame.restrict(prev_start, prev_end);

    let mut out = Vec::new();

    let avg = |f: &DailyFrame, m: &str| {
        let vals: Vec<f64> = f.series(m).into_iter().map(|(_, v)| v).collect();
        mean(&vals)
    };
    let total = |f: &DailyFrame, m: &str| {
        let vals: Vec<f64> = f.series(m).into_iter().map(|(_, v)| v).collect();
        (!vals.is_empty()).then(|| vals.iter().sum::<f64>())
    };

    if let (Some(c), Some(p)) = (avg(&this_frame, "sleep_hours"), avg(&prev_frame, "sleep_hours")) {
        if p != 0.0 {
            out.push(MonthMetric {
                metric: "sleep_hours".to_string(),
                label: "Sleep (avg h)".to_string(),
                value: round_to(c, 1),
                direction: direction(c, p, true),
            });
        }
    }
    if let (Some(c), Some(p)) = (avg(&this_frame, "weight_kg"), avg(&prev_frame, "weight_kg")) {
        out.push(MonthMetric {
            metric: "weight_kg".to_string(),
            label: "Weight (avg kg)".to_string(),
            value: round_to(c, 1),
            direction: direction(c, p, false),
        });
    }
    let this_exp: f64 = this_frame.total_expense().into_iter().flatten().sum();
    let prev_exp: f64 = prev_frame.total_expense().into_iter().flatten().sum();
    if this_frame.total_expense().iter().any(|v| v.is_some())
        || prev_frame.total_expense().iter().any(|v| v.is_some())
    {
        out.push(MonthMetric {
            metric: "expense_total".to_string(),
            label: "Expenses (total)".to_string(),
            value: round_to(this_exp, 0),
            direction: direction(this_exp, prev_exp, false),
        });
    }
    if let (Some(c), Some(p)) = (
        total(&this_frame, "deep_work_hours"),
        total(&prev_frame, "deep_work_hours"),
    ) {
        out.push(MonthMetric {
            metric: "deep_work_hours".to_string(),
            label: "Deep work (total h)".to_string(),
            value: round_to(c, 1),
            direction: direction(c, p, true),
        });
    }
    if let (Some(c), Some(p)) = (total(&this_frame, "income"), total(&prev_frame, "income")) {
        out.push(MonthMetric {
            metric: "income".to_string(),
            label: "Income (total)".to_string(),
            value: round_to(c, 0),
            direction: direction(c, p, true),
        });
    }

    out
}

// --- weekly digest ---

#[derive(Debug, Clone, Serialize, Default, ToSchema)]
pub struct SphereSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finance: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub productivity: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning: Option<serde_json::Value>,
}

/// Per-sphere rollup for the weekly report.
pub fn sphere_summary(frame: &DailyFrame) -> SphereSummary {
    let mut summary = SphereSummary::default();
    if frame.is_empty() {
        return summary;
    }

    let avg = |m: &str| {
        let vals: Vec<f64> = frame.series(m).into_iter().map(|(_, v)| v).collect();
        mean(&vals)
    };
    let total = |m: &str| {
        let vals: Vec<f64> = frame.series(m).into_iter().map(|(_, v)| v).collect();
        (!vals.is_empty()).then(|| vals.iter().sum::<f64>())
    };

    if let Some(sleep_avg) = avg("sleep_hours") {
        summary.health = Some(serde_json::json!({
            "sleep_avg": round_to(sleep_avg, 1),
            "energy_avg": avg("energy_level").map(|v| round_to(v, 1)),
            "wellbeing_avg": avg("wellbeing").map(|v| round_to(v, 1)),
        }));
    }
    if let Some(income_total) = total("income") {
        let expense_total: f64 = frame.total_expense().into_iter().flatten().sum();
        summary.finance = Some(serde_json::json!({
            "income_total": round_to(income_total, 0),
            "expense_total": round_to(expense_total, 0),
        }));
    }
    if let Some(deep_total) = total("deep_work_hours") {
        summary.productivity = Some(serde_json::json!({
            "deep_work_total": round_to(deep_total, 1),
            "tasks_total": total("tasks_completed").map(|v| v as i64),
            "focus_avg": avg("focus_level").map(|v| round_to(v, 1)),
        }));
    }
    if let Some(study_total) = total("study_hours") {
        summary.learning = Some(serde_json::json!({
            "study_total": round_to(study_total, 1),
        }));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn frame_from(rows: &[(NaiveDate, &[(&str, f64)])]) -> DailyFrame {
        let mut builder = FrameBuilder::default();
        for (d, cells) in rows {
            for (metric, value) in *cells {
                builder.add(*d, metric, *value);
            }
        }
        builder.finish()
    }

    #[test]
    fn pearson_on_perfect_line() {
        let pairs: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        let r = pearson(&pairs).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pearson_requires_variance() {
        let pairs: Vec<(f64, f64)> = (0..10).map(|i| (5.0, i as f64)).collect();
        assert!(pearson(&pairs).is_none());
    }

    #[test]
    fn same_day_entries_aggregate_by_rule() {
        let d = date(2026, 8, 1);
        let frame = frame_from(&[
            (d, &[("steps", 4000.0), ("energy_level", 4.0)]),
            (d, &[("steps", 3000.0), ("energy_level", 8.0)]),
        ]);
        // steps sum, energy mean
        assert_eq!(frame.column("steps").unwrap()[0], Some(7000.0));
        assert_eq!(frame.column("energy_level").unwrap()[0], Some(6.0));
    }

    #[test]
    fn correlations_respect_thresholds() {
        // sleep and energy perfectly correlated over 8 days
        let rows: Vec<(NaiveDate, Vec<(&str, f64)>)> = (1..=8)
            .map(|i| {
                (
                    date(2026, 8, i),
                    vec![("sleep_hours", 5.0 + i as f64 * 0.5), ("energy_level", 3.0 + i as f64)],
                )
            })
            .collect();
        let borrowed: Vec<(NaiveDate, &[(&str, f64)])> =
            rows.iter().map(|(d, v)| (*d, v.as_slice())).collect();
        let frame = frame_from(&borrowed);

        let pairs = compute_correlations(&frame);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].metric_a, "sleep_hours");
        assert_eq!(pairs[0].metric_b, "energy_level");
        assert!(pairs[0].correlation > 0.99);
        assert_eq!(pairs[0].sample_size, 8);
    }

    #[test]
    fn too_few_rows_yield_no_correlations() {
        let frame = frame_from(&[
            (date(2026, 8, 1), &[("sleep_hours", 7.0), ("energy_level", 6.0)]),
            (date(2026, 8, 2), &[("sleep_hours", 8.0), ("energy_level", 7.0)]),
        ]);
        assert!(compute_correlations(&frame).is_empty());
    }

    #[test]
    fn sleep_deep_work_insight_fires_on_large_drop() {
        let mut rows: Vec<(NaiveDate, Vec<(&str, f64)>)> = Vec::new();
        // 3 short-sleep days with weak deep work, 4 long-sleep days with strong
        for i in 1..=3 {
            rows.push((date(2026, 8, i), vec![("sleep_hours", 5.0), ("deep_work_hours", 1.0)]));
        }
        for i in 4..=7 {
            rows.push((date(2026, 8, i), vec![("sleep_hours", 8.0), ("deep_work_hours", 4.0)]));
        }
        let borrowed: Vec<(NaiveDate, &[(&str, f64)])> =
            rows.iter().map(|(d, v)| (*d, v.as_slice())).collect();
        let frame = frame_from(&borrowed);

        let msg = sleep_vs_productivity_insight(&frame).unwrap();
        assert!(msg.contains("75%"), "got: {}", msg);
    }

    #[test]
    fn fallback_insight_on_sparse_data() {
        let frame = frame_from(&[(date(2026, 8, 1), &[("sleep_hours", 7.0)])]);
        let insights = generate_insights(&frame);
        assert_eq!(insights.len(), 1);
        assert!(insights[0].message.contains("Keep tracking"));
    }

    #[test]
    fn empty_frame_yields_no_insights() {
        assert!(generate_insights(&DailyFrame::default()).is_empty());
    }

    #[test]
    fn weekday_best_worst() {
        // Two full weeks: Mondays sleep 5h, other days 8h.
        let mut rows: Vec<(NaiveDate, Vec<(&str, f64)>)> = Vec::new();
        for i in 0..14u32 {
            let d = date(2026, 8, 3) + chrono::Duration::days(i as i64); // 2026-08-03 is a Monday
            let sleep = if d.weekday().num_days_from_monday() == 0 { 5.0 } else { 8.0 };
            rows.push((d, vec![("sleep_hours", sleep)]));
        }
        let borrowed: Vec<(NaiveDate, &[(&str, f64)])> =
            rows.iter().map(|(d, v)| (*d, v.as_slice())).collect();
        let frame = frame_from(&borrowed);

        let stat = best_worst_weekday(&frame, "sleep_hours", true).unwrap();
        assert_eq!(stat.worst_weekday, "Monday");
        assert_eq!(stat.worst_value, 5.0);
        assert_eq!(stat.best_value, 8.0);
    }

    #[test]
    fn linear_trend_directions() {
        let rows: Vec<(NaiveDate, Vec<(&str, f64)>)> = (1..=10)
            .map(|i| (date(2026, 8, i), vec![("deep_work_hours", i as f64 * 0.5)]))
            .collect();
        let borrowed: Vec<(NaiveDate, &[(&str, f64)])> =
            rows.iter().map(|(d, v)| (*d, v.as_slice())).collect();
        let frame = frame_from(&borrowed);

        let trend = linear_trend(&frame, "deep_work_hours", 30).unwrap();
        assert_eq!(trend.direction, "up");
        assert!((trend.slope - 0.5).abs() < 1e-6);

        // Constant series is neutral with zero slope.
        let flat_rows: Vec<(NaiveDate, Vec<(&str, f64)>)> = (1..=10)
            .map(|i| (date(2026, 8, i), vec![("weight_kg", 80.0)]))
            .collect();
        let borrowed: Vec<(NaiveDate, &[(&str, f64)])> =
            flat_rows.iter().map(|(d, v)| (*d, v.as_slice())).collect();
        let flat = frame_from(&borrowed);
        let trend = linear_trend(&flat, "weight_kg", 30).unwrap();
        assert_eq!(trend.direction, "neutral");
        assert_eq!(trend.slope, 0.0);
    }

    #[test]
    fn month_over_month_directions() {
        let mut rows: Vec<(NaiveDate, Vec<(&str, f64)>)> = Vec::new();
        for i in 1..=10 {
            rows.push((date(2026, 7, i), vec![("sleep_hours", 6.0), ("income", 100.0)]));
        }
        for i in 1..=10 {
            rows.push((date(2026, 8, i), vec![("sleep_hours", 8.0), ("income", 50.0)]));
        }
        let borrowed: Vec<(NaiveDate, &[(&str, f64)])> =
            rows.iter().map(|(d, v)| (*d, v.as_slice())).collect();
        let frame = frame_from(&borrowed);

        let metrics = trend_this_month(&frame, date(2026, 8, 20));
        let sleep = metrics.iter().find(|m| m.metric == "sleep_hours").unwrap();
        assert_eq!(sleep.direction, "up");
        assert_eq!(sleep.value, 8.0);
        let income = metrics.iter().find(|m| m.metric == "income").unwrap();
        assert_eq!(income.direction, "down");
    }

    #[test]
    fn csv_has_header_and_rows() {
        let frame = frame_from(&[
            (date(2026, 8, 1), &[("sleep_hours", 7.5), ("income", 100.0)]),
            (date(2026, 8, 2), &[("sleep_hours", 8.0)]),
        ]);
        let csv = frame.to_csv();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("date,sleep_hours,income"));
        assert_eq!(lines.next(), Some("2026-08-01,7.5,100"));
        assert_eq!(lines.next(), Some("2026-08-02,8,"));
    }

    #[tokio::test]
    async fn frame_outer_joins_entry_tables() {
        use crate::models::entry::{HealthEntry, LearningEntry};
        use chrono::Utc;

        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        db.insert_health(&HealthEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: date(2026, 8, 1),
            timezone: "UTC".to_string(),
            sleep_hours: 7.0,
            energy_level: 6,
            wellbeing: 7,
            supplements: None,
            weight_kg: None,
            steps: None,
            heart_rate_avg: None,
            workout_minutes: None,
            notes: None,
        })
        .await
        .unwrap();
        db.insert_learning(&LearningEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: date(2026, 8, 2),
            timezone: "UTC".to_string(),
            study_hours: 2.0,
            topics: None,
            projects: None,
            notes: None,
        })
        .await
        .unwrap();

        let frame = build_daily_frame(&db, 1).await.unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.column("sleep_hours").unwrap(), &[Some(7.0), None]);
        assert_eq!(frame.column("study_hours").unwrap(), &[None, Some(2.0)]);
    }
}
