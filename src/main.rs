use std::sync::Arc;
use std::time::Duration;

use medbook::{build_state, config::Config, init_tracing, routes, slots::generation, store::Store};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cfg = Config::from_env()?;
    let state = build_state(&cfg).await?;

    if let Some(every) = cfg.slot_job_interval {
        spawn_slot_job(state.store.clone(), every, cfg.store_timeout);
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Prune + generate on a fixed interval; the first tick fires immediately.
fn spawn_slot_job(store: Arc<dyn Store>, every: Duration, limit: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let today = chrono::Utc::now().date_naive();
            if let Err(e) = generation::run(store.as_ref(), today, limit).await {
                tracing::error!(error = %e, "slot generation failed");
            }
        }
    });
}
