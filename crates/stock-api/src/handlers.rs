//! # Request Handlers
//!
//! Axum request handlers for the stockroom API.
//! Every catalog request runs a full session: rows are generated (or
//! replayed), previews are created, and the session is closed before the
//! response is sent so no preview outlives a request.

use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stock_core::{
    total_units, CachedRow, CatalogError, Funds, PresentationResponse, Resolver, SelectionEntry,
    TransactionResult,
};
use tracing::{info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Who is browsing, from the query string
#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor: String,
    /// Defaults to the actor
    #[serde(default)]
    pub household: Option<String>,
    /// Comma-separated resolver tags
    #[serde(default)]
    pub tags: Option<String>,
}

impl ActorQuery {
    fn resolver(&self) -> Resolver {
        let tags = self.tags.as_deref().unwrap_or_default();
        build_resolver(&self.actor, self.household.as_deref(), tags.split(','))
    }
}

/// Purchase request
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub actor: String,
    #[serde(default)]
    pub household: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Rows and quantities to buy; echo `stock_key` and `price` from the
    /// listed row to be refused rather than sold a regenerated row
    #[serde(default)]
    pub selection: Vec<SelectionEntry>,
}

/// Catalog listing entry
#[derive(Debug, Serialize)]
pub struct CatalogSummary {
    pub id: String,
    pub definitions: usize,
    pub refresh_period_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_refresh: Option<DateTime<Utc>>,
}

/// Rows currently offered to an actor
#[derive(Debug, Serialize)]
pub struct RowsResponse {
    pub catalog_id: String,
    pub rows: Vec<CachedRow>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub catalog_id: String,
    /// False when the catalog had not been opened yet
    pub forced: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub account: String,
    pub balance: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn catalog_error_to_response(err: CatalogError) -> (StatusCode, Json<ErrorResponse>) {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(response))
}

fn build_resolver<'a>(
    actor: &str,
    household: Option<&str>,
    tags: impl IntoIterator<Item = &'a str>,
) -> Resolver {
    let resolver = Resolver::new(actor);
    let resolver = match household {
        Some(household) => resolver.with_household(household),
        None => resolver,
    };
    tags.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .fold(resolver, |r, tag| r.with_tag(tag))
}

/// Reject selections with no units, or more than `max_units`
fn check_selection(
    selection: &[SelectionEntry],
    max_units: u64,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let units = total_units(selection);
    let (message, details) = if units == 0 {
        (
            "selection must request at least one unit".to_string(),
            "list row_id and quantity pairs from GET .../rows".to_string(),
        )
    } else if units > max_units {
        (
            format!("selection requests {} units", units),
            format!("at most {} units per purchase", max_units),
        )
    } else {
        return Ok(());
    };

    let (status, Json(body)) = catalog_error_to_response(CatalogError::InvalidSelection(message));
    Err((status, Json(body.with_details(details))))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stockroom",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// List all catalogs
pub async fn list_catalogs(State(state): State<AppState>) -> Json<Vec<CatalogSummary>> {
    let stockroom = state.stockroom.lock().await;
    let mut catalogs: Vec<CatalogSummary> = state
        .catalogs
        .values()
        .map(|c| CatalogSummary {
            id: c.id.clone(),
            definitions: c.definitions.len(),
            refresh_period_secs: c.refresh_period().num_seconds(),
            next_refresh: stockroom
                .ledgers
                .get(&c.id)
                .and_then(|l| l.next_refresh_time()),
        })
        .collect();
    catalogs.sort_by(|a, b| a.id.cmp(&b.id));
    Json(catalogs)
}

/// Rows an actor would see when opening a catalog
#[instrument(skip(state, query), fields(actor = %query.actor))]
pub async fn list_rows(
    State(state): State<AppState>,
    Path(catalog_id): Path<String>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<RowsResponse> {
    let catalog = state.catalog(&catalog_id).map_err(catalog_error_to_response)?;
    let registry = state.registry.as_ref();

    let mut guard = state.stockroom.lock().await;
    let stockroom = &mut *guard;
    let mut session = stockroom.session(catalog, query.resolver());
    let rows = session
        .open(registry, &mut stockroom.ledgers, &mut stockroom.host, Utc::now())
        .to_vec();
    session.close(&mut stockroom.host);

    Ok(Json(RowsResponse { catalog_id, rows }))
}

/// Buy rows from a catalog
#[instrument(skip(state, request), fields(actor = %request.actor, units = request.selection.len()))]
pub async fn purchase(
    State(state): State<AppState>,
    Path(catalog_id): Path<String>,
    Json(request): Json<PurchaseRequest>,
) -> ApiResult<TransactionResult> {
    let catalog = state.catalog(&catalog_id).map_err(catalog_error_to_response)?;
    check_selection(&request.selection, state.config.max_units_per_purchase)?;

    let resolver = build_resolver(
        &request.actor,
        request.household.as_deref(),
        request.tags.iter().map(String::as_str),
    );
    let account = catalog.payment_source.account(&resolver).to_string();
    let registry = state.registry.as_ref();

    let mut guard = state.stockroom.lock().await;
    let stockroom = &mut *guard;
    stockroom.funds.ensure_account(&account, state.config.starting_funds);

    let mut session = stockroom.session(catalog, resolver);
    session.open(registry, &mut stockroom.ledgers, &mut stockroom.host, Utc::now());
    let result = session
        .confirm(
            PresentationResponse::accept(request.selection),
            &mut stockroom.ledgers,
            &mut stockroom.host,
            &mut stockroom.funds,
        )
        .ok_or_else(|| {
            catalog_error_to_response(CatalogError::InvalidSelection("nothing to purchase".to_string()))
        })?;

    info!(
        "Purchase {} on {}: {} delivered, {} failed",
        result.transaction_id, catalog_id, result.purchased_count, result.failed_count
    );
    Ok(Json(result))
}

/// Force a catalog to restock on its next open
#[instrument(skip(state))]
pub async fn refresh_catalog(
    State(state): State<AppState>,
    Path(catalog_id): Path<String>,
) -> ApiResult<RefreshResponse> {
    state.catalog(&catalog_id).map_err(catalog_error_to_response)?;
    let forced = state.stockroom.lock().await.ledgers.force_refresh(&catalog_id);
    info!("Refresh requested for {} (forced: {})", catalog_id, forced);
    Ok(Json(RefreshResponse { catalog_id, forced }))
}

/// Account balance
pub async fn get_account(State(state): State<AppState>, Path(account): Path<String>) -> Json<AccountResponse> {
    let balance = state.stockroom.lock().await.funds.balance(&account);
    Json(AccountResponse { account, balance })
}
