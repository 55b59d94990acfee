//! # stock-api
//!
//! HTTP API layer for stockroom-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - REST endpoints for browsing catalogs and buying rows
//! - TOML-backed catalog and item registry loading
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/api/v1/catalogs` | List catalogs |
//! | GET | `/api/v1/catalogs/{id}/rows?actor=` | Rows offered to an actor |
//! | POST | `/api/v1/catalogs/{id}/purchase` | Buy a selection |
//! | POST | `/api/v1/catalogs/{id}/refresh` | Restock on next open |
//! | GET | `/api/v1/accounts/{account}` | Account balance |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState, Stockroom};
