// One-off repair: sets auth_id on doctor and patient profiles that lack one,
// matching the identity by email.

use medbook::{accounts, build_state, config::Config, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cfg = Config::from_env()?;
    if cfg.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set");
    }
    let state = build_state(&cfg).await?;

    let report = accounts::link_missing_auth_ids(state.store.as_ref(), state.identity.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
