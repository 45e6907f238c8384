use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use rand::Rng;
use tracing::info;

use crate::database::SqliteDatabase;
use crate::errors::Result;
use crate::integrations::IntegrationProvider;
use crate::models::entry::FinanceEntry;
use crate::models::integration::{DataSource, SyncOutcome};

pub const PROVIDER_NAME: &str = "open_banking";

const HISTORY_DAYS: i64 = 30;
const MAX_TRANSACTIONS: usize = 60;

/// Merchant keyword to finance column mapping.
const CATEGORY_MAP: [(&str, Category); 9] = [
    ("food", Category::Food),
    ("groceries", Category::Food),
    ("restaurant", Category::Food),
    ("transport", Category::Transport),
    ("fuel", Category::Transport),
    ("taxi", Category::Transport),
    ("health", Category::Health),
    ("pharmacy", Category::Health),
    ("income", Category::Income),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Income,
    Food,
    Transport,
    Health,
    Other,
}

#[derive(Debug, Clone)]
struct Transaction {
    date: NaiveDate,
    description: String,
    amount: f64,
}

fn categorize(description: &str) -> Category {
    let lowered = description.to_lowercase();
    for (keyword, category) in CATEGORY_MAP {
        if lowered.contains(keyword) {
            return category;
        }
    }
    Category::Other
}

/// No real Open Banking counterpart exists here; the provider fabricates
/// a plausible statement for the trailing month.
fn mock_transactions(today: NaiveDate) -> Vec<Transaction> {
    const MERCHANTS: [&str; 8] = [
        "Corner Groceries",
        "City Transport Pass",
        "Sunrise Restaurant",
        "Central Pharmacy",
        "Fuel Station 24",
        "Bookshop Online",
        "Hardware Depot",
        "Streaming Service",
    ];

    let mut rng = rand::thread_rng();
    let mut transactions = Vec::new();

    for offset in 0..HISTORY_DAYS {
        let date = today - Duration::days(offset);

        // Salary lands twice a month.
        if date.format("%d").to_string() == "01" || date.format("%d").to_string() == "15" {
            transactions.push(Transaction {
                date,
                description: "Employer income transfer".to_string(),
                amount: rng.gen_range(500.0..3000.0),
            });
        }

        for _ in 0..rng.gen_range(0..=2) {
            let merchant = MERCHANTS[rng.gen_range(0..MERCHANTS.len())];
            transactions.push(Transaction {
                date,
                description: merchant.to_string(),
                amount: -rng.gen_range(5.0..150.0),
            });
        }
    }

    transactions.truncate(MAX_TRANSACTIONS);
    transactions
}

#[derive(Debug, Default, Clone, Copy)]
struct DayTotals {
    income: f64,
    food: f64,
    transport: f64,
    health: f64,
    other: f64,
}

fn aggregate_by_day(transactions: &[Transaction]) -> BTreeMap<NaiveDate, DayTotals> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();
    for tx in transactions {
        let totals = days.entry(tx.date).or_default();
        let magnitude = tx.amount.abs();
        match categorize(&tx.description) {
            Category::Income => totals.income += tx.amount.max(0.0),
            Category::Food => totals.food += magnitude,
            Category::Transport => totals.transport += magnitude,
            Category::Health => totals.health += magnitude,
            Category::Other => totals.other += magnitude,
        }
    }
    days
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn apply_day_totals(
    db: &SqliteDatabase,
    user_id: i64,
    days: &BTreeMap<NaiveDate, DayTotals>,
) -> Result<(usize, usize)> {
    let mut updated = 0;
    let mut created = 0;

    for (date, totals) in days {
        match db.get_finance_by_date(user_id, *date).await? {
            Some(mut entry) => {
                entry.income = round2(entry.income + totals.income);
                entry.expense_food = round2(entry.expense_food + totals.food);
                entry.expense_transport = round2(entry.expense_transport + totals.transport);
                entry.expense_health = round2(entry.expense_health + totals.health);
                entry.expense_other = round2(entry.expense_other + totals.other);
                db.update_finance(&entry).await?;
                updated += 1;
            }
            None => {
                db.insert_finance(&FinanceEntry {
                    id: 0,
                    user_id,
                    recorded_at: Utc::now(),
                    local_date: *date,
                    timezone: "UTC".to_string(),
                    income: round2(totals.income),
                    expense_food: round2(totals.food),
                    expense_transport: round2(totals.transport),
                    expense_health: round2(totals.health),
                    expense_other: round2(totals.other),
                    notes: Some("Imported from Open Banking".to_string()),
                })
                .await?;
                created += 1;
            }
        }
    }

    Ok((updated, created))
}

/// Mark the mock bank connection as established.
pub async fn connect(db: &SqliteDatabase, user_id: i64) -> Result<DataSource> {
    let source = db
        .upsert_data_source(
            user_id,
            PROVIDER_NAME,
            "connected",
            None,
            None,
            None,
            Some(&serde_json::json!({"mode": "mock"})),
        )
        .await?;
    info!(user_id, "open banking connected (mock mode)");
    Ok(source)
}

pub struct OpenBankingProvider;

#[async_trait]
impl IntegrationProvider for OpenBankingProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn sync(&self, db: &SqliteDatabase, source: &DataSource) -> Result<SyncOutcome> {
        let transactions = mock_transactions(Utc::now().date_naive());
        if transactions.is_empty() {
            return Ok(SyncOutcome::skipped("No transactions in the statement"));
        }

        let days = aggregate_by_day(&transactions);
        let (updated, created) = apply_day_totals(db, source.user_id, &days).await?;

        Ok(SyncOutcome::success(
            format!("Imported {} transactions", transactions.len()),
            serde_json::json!({
                "transactions": transactions.len(),
                "days": days.len(),
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
    fn categorization_matches_keywords() {
        assert_eq!(categorize("Corner Groceries"), Category::Food);
        assert_eq!(categorize("Fuel Station 24"), Category::Transport);
        assert_eq!(categorize("Central Pharmacy"), Category::Health);
        assert_eq!(categorize("Employer income transfer"), Category::Income);
        assert_eq!(categorize("Bookshop Online"), Category::Other);
    }

    #[test]
    fn mock_statement_stays_within_limits() {
        let transactions = mock_transactions(NaiveDate::from_ymd_opt(2026, 8, 25).unwrap());
        assert!(transactions.len() <= MAX_TRANSACTIONS);
        for tx in &transactions {
            if categorize(&tx.description) == Category::Income {
                assert!(tx.amount >= 500.0 && tx.amount < 3000.0);
            } else {
                assert!(tx.amount <= -5.0 && tx.amount > -150.0);
            }
        }
    }

    #[test]
    fn aggregation_splits_income_and_expenses() {
        let day = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        let transactions = vec![
            Transaction {
                date: day,
                description: "Employer income transfer".to_string(),
                amount: 1200.0,
            },
            Transaction {
                date: day,
                description: "Corner Groceries".to_string(),
                amount: -45.5,
            },
            Transaction {
                date: day,
                description: "Hardware Depot".to_string(),
                amount: -20.0,
            },
        ];
        let days = aggregate_by_day(&transactions);
        let totals = days.get(&day).unwrap();
        assert_eq!(totals.income, 1200.0);
        assert_eq!(totals.food, 45.5);
        assert_eq!(totals.other, 20.0);
    }

    #[tokio::test]
    async fn totals_merge_into_existing_finance_row() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        db.seed_users(1).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        db.insert_finance(&FinanceEntry {
            id: 0,
            user_id: 1,
            recorded_at: Utc::now(),
            local_date: day,
            timezone: "UTC".to_string(),
            income: 100.0,
            expense_food: 10.0,
            expense_transport: 0.0,
            expense_health: 0.0,
            expense_other: 0.0,
            notes: None,
        })
        .await
        .unwrap();

        let mut days = BTreeMap::new();
        days.insert(
            day,
            DayTotals {
                income: 1200.0,
                food: 30.0,
                transport: 12.5,
                health: 0.0,
                other: 8.0,
            },
        );

        let (updated, created) = apply_day_totals(&db, 1, &days).await.unwrap();
        assert_eq!((updated, created), (1, 0));

        let entry = db.get_finance_by_date(1, day).await.unwrap().unwrap();
        assert_eq!(entry.income, 1300.0);
        assert_eq!(entry.expense_food, 40.0);
        assert_eq!(entry.expense_transport, 12.5);
        assert_eq!(entry.expense_other, 8.0);
    }
}
