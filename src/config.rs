use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// `None` selects the in-process backends.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub store_timeout: Duration,
    pub slot_job_interval: Option<Duration>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok()))
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = get("DATABASE_URL").filter(|s| !s.trim().is_empty());
        let bind_addr = get("BIND_ADDR")
            .or_else(|| get("PORT").map(|p| format!("0.0.0.0:{}", p.trim())))
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let session_ttl_hours = get("SESSION_TTL_HOURS")
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(24);
        let store_timeout_ms = get("STORE_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(5000);
        let slot_job_interval = get("SLOT_JOB_INTERVAL_HOURS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|h| *h > 0)
            .map(|h| Duration::from_secs(h * 3600));

        Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            store_timeout: Duration::from_millis(store_timeout_ms),
            slot_job_interval,
        }
    }
}
