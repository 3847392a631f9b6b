//! GEA Portal server and maintenance CLI
//!
//! # Usage
//!
//! ```bash
//! # Serve the REST API with the reminder loop
//! gea_portal serve
//!
//! # Run one reminder cycle for a given day (defaults to today)
//! gea_portal run-reminders --date 2025-01-30
//!
//! # Create the configured GEA admin account if missing
//! gea_portal bootstrap
//! ```

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use gea_portal::blob_store::LocalDocumentStorage;
use gea_portal::config::PortalConfig;
use gea_portal::directory::bootstrap_admins;
use gea_portal::notify::{EmailTransport, LogEmailTransport, RelayEmailTransport};
use gea_portal::store::{MemoryStore, PortalStore};
use gea_portal::{api, Portal, ReminderLoop};

#[derive(Parser)]
#[command(name = "gea_portal")]
#[command(version)]
#[command(about = "GLAB certification workflow portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Listen address (overrides PORTAL_BIND_ADDR)
        #[arg(long, env = "PORTAL_BIND_ADDR")]
        bind: Option<SocketAddr>,

        /// Do not start the background reminder loop
        #[arg(long)]
        no_reminders: bool,
    },

    /// Run a single reminder cycle and exit
    RunReminders {
        /// Day to run for (YYYY-MM-DD); defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Create the configured admin account if it does not exist
    Bootstrap,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gea_portal=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = PortalConfig::from_env().context("Invalid portal configuration")?;
    let store = open_store(&config).await?;

    match cli.command {
        Commands::Serve { bind, no_reminders } => serve(config, store, bind, no_reminders).await,
        Commands::RunReminders { date } => {
            let portal = build_portal(&config, store)?;
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = portal
                .scheduler
                .run_daily_cycle(today)
                .await
                .context("Reminder cycle failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Bootstrap => {
            match bootstrap_admins(store.as_ref(), &config.bootstrap).await? {
                Some(admin) => println!("Created admin account {}", admin.username),
                None => println!("Nothing to do"),
            }
            Ok(())
        }
    }
}

async fn serve(
    config: PortalConfig,
    store: Arc<dyn PortalStore>,
    bind: Option<SocketAddr>,
    no_reminders: bool,
) -> Result<()> {
    bootstrap_admins(store.as_ref(), &config.bootstrap)
        .await
        .context("Admin bootstrap failed")?;

    let portal = build_portal(&config, store)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reminders = if no_reminders {
        None
    } else {
        Some(ReminderLoop::new(portal.scheduler.clone(), config.reminder_interval).spawn(shutdown_rx))
    };

    let app = api::router(portal.app_state());
    let addr = bind.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "GEA portal listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = reminders {
        let _ = handle.await;
    }
    Ok(())
}

fn build_portal(config: &PortalConfig, store: Arc<dyn PortalStore>) -> Result<Portal> {
    let email: Arc<dyn EmailTransport> = match &config.email_relay_url {
        Some(url) => Arc::new(
            RelayEmailTransport::new(url.clone()).context("Failed to build email relay client")?,
        ),
        None => {
            info!("No email relay configured; emails are logged only");
            Arc::new(LogEmailTransport)
        }
    };
    let documents = Arc::new(LocalDocumentStorage::new(config.upload_dir.clone()));
    Ok(Portal::new(store, documents, email, config))
}

#[cfg(feature = "database")]
async fn open_store(config: &PortalConfig) -> Result<Arc<dyn PortalStore>> {
    match &config.database {
        Some(db) => {
            let pool = db.connect().await.context("Failed to connect to database")?;
            Ok(Arc::new(gea_portal::store::PgPortalStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "database"))]
async fn open_store(config: &PortalConfig) -> Result<Arc<dyn PortalStore>> {
    if config.database.is_some() {
        warn!("DATABASE_URL is set but the database feature is disabled; using the in-memory store");
    }
    Ok(Arc::new(MemoryStore::new()))
}
