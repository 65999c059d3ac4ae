use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolvault::config::Config;
use toolvault::db::{AppState, create_pool, init_db, queries};
use toolvault::handlers;
use toolvault::licensing;
use toolvault::models::CreateProduct;

#[derive(Parser, Debug)]
#[command(name = "toolvault")]
#[command(about = "License back end for a game-tool storefront")]
struct Cli {
    /// Seed the catalog with sample products (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Run the license lifecycle sweep once and exit (for system cron)
    #[arg(long)]
    sweep: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the catalog with a few products covering each license shape.
/// Only runs in dev mode and when the catalog is empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let (_, count) = queries::list_products_paginated(&conn, true, 1, 0)
        .expect("Failed to count products");
    if count > 0 {
        tracing::info!("Catalog already has products, skipping seed");
        return;
    }

    let samples = [
        CreateProduct {
            name: "Aim Trainer Pro".to_string(),
            slug: "aim-trainer-pro".to_string(),
            description: Some("Monthly aim training suite".to_string()),
            price_cents: 999,
            currency: "usd".to_string(),
            duration_days: Some(30),
            requires_hardware_binding: true,
            download_url: Some("https://downloads.toolvault.local/aim-trainer-pro.zip".to_string()),
        },
        CreateProduct {
            name: "Macro Kit".to_string(),
            slug: "macro-kit".to_string(),
            description: Some("Perpetual macro editor".to_string()),
            price_cents: 2499,
            currency: "usd".to_string(),
            duration_days: None,
            requires_hardware_binding: false,
            download_url: Some("https://downloads.toolvault.local/macro-kit.zip".to_string()),
        },
        CreateProduct {
            name: "Overlay Weekly".to_string(),
            slug: "overlay-weekly".to_string(),
            description: None,
            price_cents: 199,
            currency: "usd".to_string(),
            duration_days: Some(7),
            requires_hardware_binding: false,
            download_url: None,
        },
    ];

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV CATALOG");
    tracing::info!("============================================");
    for input in &samples {
        let product = queries::create_product(&conn, input).expect("Failed to create dev product");
        tracing::info!("Product: {} (id: {})", product.name, product.id);
    }
    tracing::info!("============================================");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolvault=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState::new(db_pool, &config);

    // One-shot sweep for schedulers that run the binary instead of calling the endpoint
    if cli.sweep {
        match licensing::run_sweep_and_deliver(&state, chrono::Utc::now().timestamp()).await {
            Ok(report) => {
                println!(
                    "{}",
                    serde_json::to_string(&report).expect("SweepReport serializes")
                );
                return;
            }
            Err(e) => {
                eprintln!("License sweep failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set TOOLVAULT_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("toolvault listening on {}", addr);

    // Connect info feeds the client address into the download log
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
