// HTTP surface: three routes translating request parameters into data service
// calls. Data service failures become a generic 500; details only hit the log.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::BODY_LIMIT_BYTES;
use crate::error::ApiError;
use crate::models::{Company, TransactionWithCompany};
use crate::query::ListParams;
use crate::store::DataService;

pub const LIST_FAILED: &str = "Failed to fetch transactions";
pub const UPDATE_FAILED: &str = "Failed to update client";
pub const DEDUPE_FAILED: &str = "Failed to remove duplicates";
pub const MISSING_FIELDS: &str = "cnpj and newStatus are required";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataService>,
}

/// GET /transactions response
#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub data: Vec<TransactionWithCompany>,
    #[serde(rename = "totalItems")]
    pub total_items: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /update-client body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    pub cnpj: Option<String>,
    pub new_status: Option<String>,
    pub new_observation: Option<String>,
    pub tasks: Option<Value>,
    pub attachment_url: Option<String>,
}

/// Validated client update: the status for every transaction of the company
/// plus the full replacement of its metadata row
#[derive(Debug, PartialEq)]
pub struct ClientUpdate {
    pub status: String,
    pub company: Company,
}

impl UpdateClientRequest {
    pub fn validate(self) -> Result<ClientUpdate, ApiError> {
        let cnpj = self.cnpj.filter(|v| !v.is_empty());
        let status = self.new_status.filter(|v| !v.is_empty());

        match (cnpj, status) {
            (Some(cnpj), Some(status)) => Ok(ClientUpdate {
                status,
                company: Company {
                    cnpj,
                    observation: self.new_observation,
                    tasks: self.tasks.filter(|t| !t.is_null()),
                    attachment_url: self.attachment_url,
                },
            }),
            _ => Err(ApiError::BadRequest(MISSING_FIELDS.to_string())),
        }
    }
}

pub fn router(store: Arc<dyn DataService>) -> Router {
    Router::new()
        .route("/transactions", get(list_transactions))
        .route("/update-client", post(update_client))
        .route("/remove-duplicates", post(remove_duplicates))
        .with_state(AppState { store })
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /transactions - filtered, sorted, paginated listing
async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<TransactionListResponse>, ApiError> {
    let query = params.to_query();
    debug!(?query, "listing transactions");

    match state.store.list_transactions(&query).await {
        Ok(page) => Ok(Json(TransactionListResponse {
            data: page.rows,
            total_items: page.total,
        })),
        Err(e) => {
            error!(error = %e, "error fetching transactions");
            Err(ApiError::Internal(LIST_FAILED))
        }
    }
}

/// Unreadable bodies (over the size limit, broken stream) keep the extractor's
/// status; anything that is not a usable JSON object is a missing-fields 400
fn reject_body(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::BytesRejection(_) => {
            warn!(error = %rejection, "could not read update-client body");
            ApiError::Rejected {
                status: rejection.status(),
                message: rejection.body_text(),
            }
        }
        _ => {
            debug!(error = %rejection, "rejected update-client body");
            ApiError::BadRequest(MISSING_FIELDS.to_string())
        }
    }
}

/// POST /update-client - set status on all of a company's transactions,
/// then upsert its metadata.
///
/// The two writes are independent: when the upsert fails the status change
/// stays committed and the caller still gets a 500.
async fn update_client(
    State(state): State<AppState>,
    body: Result<Json<UpdateClientRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body.map_err(reject_body)?;
    let update = request.validate()?;
    let cnpj = update.company.cnpj.as_str();

    if let Err(e) = state
        .store
        .update_transaction_status(cnpj, &update.status)
        .await
    {
        error!(error = %e, cnpj, "error updating transaction status");
        return Err(ApiError::Internal(UPDATE_FAILED));
    }

    if let Err(e) = state.store.upsert_company(&update.company).await {
        error!(error = %e, cnpj, "error upserting company data, status change already applied");
        return Err(ApiError::Internal(UPDATE_FAILED));
    }

    info!(cnpj, status = %update.status, "client updated");
    Ok(Json(MessageResponse {
        message: "Client updated successfully".to_string(),
    }))
}

/// POST /remove-duplicates - run the deduplication procedure
async fn remove_duplicates(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    match state.store.remove_duplicate_transactions().await {
        Ok(count) => {
            let removed = count.unwrap_or(0);
            info!(removed, "duplicate transactions removed");
            Ok(Json(MessageResponse {
                message: format!("{} duplicate transactions removed", removed),
            }))
        }
        Err(e) => {
            error!(error = %e, "error removing duplicates");
            Err(ApiError::Internal(DEDUPE_FAILED))
        }
    }
}
