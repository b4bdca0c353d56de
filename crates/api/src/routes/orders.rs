//! Order read endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use order_store::{OrderId, OrderRecord, OrderStore};

use crate::AppState;
use crate::error::ApiError;

/// GET /orders/{id}
///
/// Returns the persisted record for a checkout session or invoice id.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderRecord>, ApiError> {
    let record = state
        .orders
        .get(&OrderId::new(id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(record))
}
