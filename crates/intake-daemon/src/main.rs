// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `intake-daemon` binary: env config, Postgres stores, axum serve.

use anyhow::Context as _;
use clap::Parser;
use intake_config::Settings;
use intake_daemon::{AppState, Stores, build_app};
use intake_gateway::HttpProjectResolver;
use intake_normalize::{ProjectResolver, StubProjectResolver};
use intake_store::postgres::PgStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "intake-daemon", about = "Intent normalisation service")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080", env = "INTAKE_BIND")]
    bind: String,

    /// Run schema migrations before serving.
    #[arg(long)]
    migrate: bool,
}

fn build_resolver(settings: &Settings) -> anyhow::Result<Arc<dyn ProjectResolver>> {
    match &settings.context_api_base_url {
        Some(base_url) if !base_url.is_empty() => {
            let resolver = HttpProjectResolver::new(
                base_url.clone(),
                settings.context_api_bearer_token.clone(),
                settings.context_api_project_search_path.clone(),
                Duration::from_secs_f64(settings.context_api_timeout_seconds),
            )
            .context("building project resolver client")?;
            Ok(Arc::new(resolver))
        }
        _ => Ok(Arc::new(StubProjectResolver)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("loading settings")?;
    settings.validate().context("validating settings")?;

    let store = PgStore::connect(&settings.database_url)
        .await
        .context("connecting to the database")?;
    if args.migrate {
        store.migrate().await.context("running migrations")?;
        info!("schema migrations applied");
    }

    let store = Arc::new(store);
    let stores = Stores {
        intents: store.clone(),
        clarifications: store.clone(),
        journal: store,
    };
    let resolver = build_resolver(&settings)?;
    let state = Arc::new(AppState::new(settings, stores, resolver)?);

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!(addr = %args.bind, "intake daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serving")?;
    Ok(())
}
