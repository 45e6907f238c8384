use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;

static CACHE: Lazy<DashMap<String, (serde_json::Value, Instant)>> = Lazy::new(DashMap::new);

/// Fetch a cached payload if its TTL has not elapsed.
pub fn get_json(key: &str) -> Option<serde_json::Value> {
    let entry = CACHE.get(key)?;
    let (value, stored_at) = entry.value();
    if stored_at.elapsed() > ttl() {
        drop(entry);
        CACHE.remove(key);
        return None;
    }
    Some(value.clone())
}

pub fn set_json(key: &str, payload: serde_json::Value) {
    CACHE.insert(key.to_string(), (payload, Instant::now()));
}

/// Drop every cached payload for one user (entry writes invalidate
/// that user's analytics).
pub fn invalidate_user(user_id: i64) {
    let suffix = format!(":{}", user_id);
    CACHE.retain(|key, _| !key.ends_with(&suffix));
}

fn ttl() -> Duration {
    Duration::from_secs(crate::config::get_settings().cache_ttl_seconds)
}

pub fn cache_key(endpoint: &str, user_id: i64) -> String {
    format!("{}:{}", endpoint, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_env() {
        std::env::set_var("JWT_SECRET", "test-secret");
    }

    #[test]
    fn set_get_and_invalidate() {
        init_env();
        let key = cache_key("insights", 42);
        set_json(&key, serde_json::json!({"ok": true}));
        assert_eq!(get_json(&key).unwrap()["ok"], true);

        invalidate_user(42);
        assert!(get_json(&key).is_none());
    }

    #[test]
    fn invalidation_is_scoped_to_user() {
        init_env();
        set_json(&cache_key("insights", 1), serde_json::json!(1));
        set_json(&cache_key("insights", 2), serde_json::json!(2));
        invalidate_user(1);
        assert!(get_json(&cache_key("insights", 1)).is_none());
        assert!(get_json(&cache_key("insights", 2)).is_some());
    }
}
