use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use truck_service::{create_router, repositories, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🚚 Truck Service");

    let config = AppConfig::from_env()?;

    let repository = match repositories::connect(&config.backend).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("❌ Could not initialise the truck store: {}", e);
            return Err(anyhow::anyhow!("Store error: {}", e));
        }
    };
    info!("✅ Store ready ({})", repository.backend_name());

    let addr: SocketAddr = config.server.server_url().parse()?;
    let app = create_router(AppState::new(repository, config.server.clone()));

    info!("🌐 Server listening on http://{}", addr);
    info!("   POST   /trucks - Create truck");
    info!("   GET    /trucks - List trucks");
    info!("   GET    /trucks/:id - Get truck");
    info!("   PUT    /trucks/:id - Update truck");
    info!("   DELETE /trucks/:id - Delete truck");
    info!("   GET    /trucks/available/:date - Trucks available on a date");
    info!("   PUT    /trucks/:id/busy/:date - Mark truck busy");
    info!("   DELETE /trucks/:id/busy/:date - Clear busy date");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server error: {}", e);
        return Err(e.into());
    }

    info!("👋 Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Ctrl+C received, shutting down...");
        },
        _ = terminate => {
            info!("🛑 Terminate signal received, shutting down...");
        },
    }
}
