//! Statistics API handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use hashdex_core::Statistics;
use serde::Deserialize;

use super::handlers::{index_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    /// Start token, e.g. `2021-01-01`; its shape sets the bucket granularity.
    pub from: String,
    /// Number of granularity units to cover.
    #[serde(default = "default_n")]
    pub n: u32,
}

fn default_n() -> u32 {
    1
}

/// GET /api/v1/statistics
///
/// Discovery counts per time bucket. Buckets without discoveries are omitted.
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<Statistics>, ApiError> {
    let statistics = state
        .index()
        .get_statistics(&params.from, params.n)
        .await
        .map_err(index_error)?;

    Ok(Json(statistics))
}
