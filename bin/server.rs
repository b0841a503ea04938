// Transactions BFF - Web Server

use anyhow::{Context, Result};
use tracing::{error, info};
use transactions_bff::{init_tracing, router, store, Config, VERSION};

async fn run(config: Config) -> Result<()> {
    let data_service = store::connect(&config).context("Failed to connect to the data service")?;
    let app = router(data_service);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("listening on http://{}", addr);
    info!("routes: GET /transactions, POST /update-client, POST /remove-duplicates");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    info!("transactions-bff {} starting", VERSION);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
