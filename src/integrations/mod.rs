use std::sync::Arc;

use async_trait::async_trait;

use crate::database::SqliteDatabase;
use crate::errors::Result;
use crate::models::integration::{DataSource, SyncOutcome};

pub mod apple_health;
pub mod google_fit;
pub mod open_banking;

/// A remote data provider that can pull entries into the dashboard.
#[async_trait]
pub trait IntegrationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn sync(&self, db: &SqliteDatabase, source: &DataSource) -> Result<SyncOutcome>;
}

/// Providers that support background sync. Apple Health is file-import
/// only and is not listed here.
pub fn provider_for(name: &str) -> Option<Arc<dyn IntegrationProvider>> {
    match name {
        google_fit::PROVIDER_NAME => Some(Arc::new(google_fit::GoogleFitProvider::new())),
        open_banking::PROVIDER_NAME => Some(Arc::new(open_banking::OpenBankingProvider)),
        _ => None,
    }
}

pub fn syncable_providers() -> [&'static str; 2] {
    [google_fit::PROVIDER_NAME, open_banking::PROVIDER_NAME]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_syncable_providers() {
        for name in syncable_providers() {
            let provider = provider_for(name).unwrap();
            assert_eq!(provider.name(), name);
        }
        assert!(provider_for("apple_health").is_none());
        assert!(provider_for("bogus").is_none());
    }
}
