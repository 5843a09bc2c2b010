use std::env;

use anyhow::Result;
use carryon_api::build_app;
use carryon_core::AdvisorConfig;
use carryon_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("carryon_api");

    let config = AdvisorConfig::from_env();
    let bind = env::var("CARRYON_BIND")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            env::var("PORT")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(|port| format!("0.0.0.0:{port}"))
        })
        .unwrap_or_else(|| "0.0.0.0:8080".to_string());

    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "carryon advisor api started");

    axum::serve(listener, app).await?;
    Ok(())
}
