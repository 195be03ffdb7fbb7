pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod roles;
pub mod routes;
pub mod slots;
pub mod store;

use std::sync::Arc;

use crate::config::Config;
use crate::identity::{memory::MemoryIdentity, pg::PgIdentity};
use crate::models::AppState;
use crate::store::{memory::MemoryStore, pg::PgStore};

/// Picks Postgres backends when a database URL is configured, the
/// in-process ones otherwise.
pub async fn build_state(cfg: &Config) -> anyhow::Result<AppState> {
    let state = match cfg.database_url.as_deref() {
        Some(url) => {
            let pool = db::connect_pg(url).await?;
            AppState {
                store: Arc::new(PgStore::new(pool.clone())),
                identity: Arc::new(PgIdentity::new(pool, cfg.session_ttl_hours)),
                store_timeout: cfg.store_timeout,
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            AppState {
                store: Arc::new(MemoryStore::new()),
                identity: Arc::new(MemoryIdentity::new(cfg.session_ttl_hours)),
                store_timeout: cfg.store_timeout,
            }
        }
    };
    Ok(state)
}

/// Installs the fmt subscriber with `RUST_LOG` filtering, `info` by default.
pub fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();
    Ok(())
}
