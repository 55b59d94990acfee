//! # Stockroom RS
//!
//! Serves the catalogs in `config/` over HTTP. Each request opens a catalog
//! session against shared stock ledgers, so stock drawn at a refresh is the
//! same for every actor until the catalog's window closes.
//!
//! ## Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` / `PORT` | `127.0.0.1` / `8080` |
//! | `CATALOG_CONFIG` | `config/catalogs.toml` |
//! | `ITEMS_CONFIG` | `config/items.toml` |
//! | `STARTING_FUNDS` | `1000` |
//! | `MAX_UNITS` | `100` |
//! | `RNG_SEED` | entropy |
//! | `ENVIRONMENT` | `development` |
//! | `RUST_LOG` | `info` |

use stock_api::{routes, state::AppState};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let state = AppState::new()?;
    log_stockroom(&state);

    let addr = state.config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Stockroom {} listening on http://{}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, routes::create_router(state)).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// One line per catalog so a bad config file is visible at startup
fn log_stockroom(state: &AppState) {
    let config = &state.config;
    info!(
        "Environment {}: {} items, {} recipes",
        config.environment,
        state.registry.items.len(),
        state.registry.recipes.len()
    );

    let mut catalogs: Vec<_> = state.catalogs.values().collect();
    catalogs.sort_by(|a, b| a.id.cmp(&b.id));
    for catalog in catalogs {
        match catalog.stock_policy {
            Some(_) => info!(
                "Catalog {}: {} definitions, restocks every {}s",
                catalog.id,
                catalog.definitions.len(),
                catalog.refresh_period().num_seconds()
            ),
            None => info!(
                "Catalog {}: {} definitions, regenerated on every open",
                catalog.id,
                catalog.definitions.len()
            ),
        }
    }
    if state.catalogs.is_empty() {
        warn!("No catalogs loaded; every catalog request will 404");
    }

    info!(
        "New accounts start with {}; at most {} units per purchase",
        config.starting_funds, config.max_units_per_purchase
    );
    match config.rng_seed {
        Some(seed) => info!("Rolls seeded with {}", seed),
        None => info!("Rolls seeded from entropy"),
    }
}
