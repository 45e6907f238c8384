use once_cell::sync::Lazy;

/// Runtime settings read once from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub warehouse_path: String,
    pub jwt_secret: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub cache_ttl_seconds: u64,
    pub sync_min_interval_seconds: i64,
    pub rate_limit_per_sec: u32,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: Option<String>,
}

fn parse_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() || value.trim() == "*" {
        return vec!["*".to_string()];
    }
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

static SETTINGS: Lazy<Settings> = Lazy::new(|| Settings {
    database_path: env_or("DATABASE_PATH", "data/lifedash.db"),
    warehouse_path: env_or("WAREHOUSE_PATH", "data/warehouse.db"),
    jwt_secret: std::env::var("JWT_SECRET")
        .expect("JWT_SECRET must be set in environment for production!"),
    port: env_or("PORT", "8080").parse().unwrap_or(8080),
    cors_origins: parse_list(&env_or("CORS_ORIGINS", "*")),
    cache_ttl_seconds: env_or("CACHE_TTL_SECONDS", "300").parse().unwrap_or(300),
    sync_min_interval_seconds: env_or("SYNC_MIN_INTERVAL_SECONDS", "60")
        .parse()
        .unwrap_or(60),
    rate_limit_per_sec: env_or("RATE_LIMIT_PER_SEC", "20").parse().unwrap_or(20),
    google_client_id: std::env::var("GOOGLE_CLIENT_ID").ok(),
    google_client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
    google_redirect_uri: std::env::var("GOOGLE_REDIRECT_URI").ok(),
});

pub fn get_settings() -> &'static Settings {
    &SETTINGS
}

#[cfg(test)]
mod tests {
    use super::parse_list;

    #[test]
    fn parse_list_wildcard_and_empty() {
        assert_eq!(parse_list("*"), vec!["*".to_string()]);
        assert_eq!(parse_list(""), vec!["*".to_string()]);
    }

    #[test]
    fn parse_list_splits_and_trims() {
        assert_eq!(
            parse_list("http://a.test, http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
