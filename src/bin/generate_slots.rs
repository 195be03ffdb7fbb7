// Prunes past slot partitions and generates next week's slots, then exits.
// Meant to be run from cron.
//
// Usage: generate_slots [YYYY-MM-DD]   (defaults to today, UTC)

use anyhow::Context;
use medbook::{build_state, config::Config, init_tracing, models::parse_date, slots::generation};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let today = match std::env::args().nth(1) {
        Some(raw) => parse_date(&raw).with_context(|| format!("expected YYYY-MM-DD, got {raw}"))?,
        None => chrono::Utc::now().date_naive(),
    };

    let cfg = Config::from_env()?;
    if cfg.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set; generating into an in-memory store has no effect");
    }
    let state = build_state(&cfg).await?;

    let report = generation::run(state.store.as_ref(), today, cfg.store_timeout).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
