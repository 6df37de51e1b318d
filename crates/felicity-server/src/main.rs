mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use felicity_api::AppStateInner;
use felicity_api::directory::{Directory, RemoteDirectory, StaticDirectory};
use felicity_gateway::dispatcher::Dispatcher;

use config::{Config, DirectorySource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "felicity=debug,felicity_api=debug,felicity_gateway=debug,felicity_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = felicity_db::Database::open(&config.db_path)?;

    let directory = match &config.directory {
        DirectorySource::CoreApi(url) => Directory::Remote(RemoteDirectory::new(url.clone())?),
        DirectorySource::RosterFile(path) => Directory::Static(StaticDirectory::from_file(path)?),
    };

    // Shared state
    let state = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        directory,
    });

    let app = felicity_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Felicity forum listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
