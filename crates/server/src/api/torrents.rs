//! Torrent API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use hashdex_core::{File, InfoHash, OrderingCriteria, TorrentMetadata, TorrentQuery};
use serde::{Deserialize, Serialize};

use super::handlers::{api_error, index_error, ApiError};
use crate::state::AppState;

/// Largest page a client may request.
pub const MAX_LIMIT: u32 = 100;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TorrentListParams {
    #[serde(default)]
    pub query: Option<String>,
    /// Unix seconds; defaults to now.
    #[serde(default)]
    pub epoch: Option<i64>,
    #[serde(default)]
    pub order_by: OrderingCriteria,
    #[serde(default)]
    pub ascending: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub last_ordered_value: Option<f64>,
    #[serde(default)]
    pub last_id: Option<i64>,
}

fn default_limit() -> u32 {
    20
}

impl TorrentListParams {
    fn into_query(self) -> TorrentQuery {
        TorrentQuery {
            query: self.query.unwrap_or_default(),
            epoch: self.epoch.unwrap_or_else(|| Utc::now().timestamp()),
            order_by: self.order_by,
            ascending: self.ascending,
            limit: self.limit.min(MAX_LIMIT),
            last_ordered_value: self.last_ordered_value,
            last_id: self.last_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TorrentListResponse {
    pub torrents: Vec<TorrentMetadata>,
}

#[derive(Debug, Serialize)]
pub struct TorrentCountResponse {
    pub estimate: u64,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<File>,
}

fn parse_info_hash(raw: &str) -> Result<InfoHash, ApiError> {
    raw.parse::<InfoHash>()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

fn not_found(info_hash: &InfoHash) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!("Torrent not found: {}", info_hash),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/torrents
///
/// One page of search results. Pass the last row's sort value and id as
/// `last_ordered_value` and `last_id` to get the next page.
pub async fn list_torrents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TorrentListParams>,
) -> Result<Json<TorrentListResponse>, ApiError> {
    let query = params.into_query();

    let torrents = state
        .index()
        .query_torrents(&query)
        .await
        .map_err(index_error)?;

    Ok(Json(TorrentListResponse { torrents }))
}

/// GET /api/v1/torrents/count
///
/// Approximate number of stored torrents.
pub async fn count_torrents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TorrentCountResponse>, ApiError> {
    let estimate = state
        .index()
        .get_number_of_torrents()
        .await
        .map_err(index_error)?;

    Ok(Json(TorrentCountResponse { estimate }))
}

/// GET /api/v1/torrents/{info_hash}
pub async fn get_torrent(
    State(state): State<Arc<AppState>>,
    Path(info_hash): Path<String>,
) -> Result<Json<TorrentMetadata>, ApiError> {
    let info_hash = parse_info_hash(&info_hash)?;

    match state.index().get_torrent(&info_hash).await {
        Ok(Some(torrent)) => Ok(Json(torrent)),
        Ok(None) => Err(not_found(&info_hash)),
        Err(e) => Err(index_error(e)),
    }
}

/// GET /api/v1/torrents/{info_hash}/files
pub async fn get_files(
    State(state): State<Arc<AppState>>,
    Path(info_hash): Path<String>,
) -> Result<Json<FileListResponse>, ApiError> {
    let info_hash = parse_info_hash(&info_hash)?;

    match state.index().get_files(&info_hash).await {
        Ok(Some(files)) => Ok(Json(FileListResponse { files })),
        Ok(None) => Err(not_found(&info_hash)),
        Err(e) => Err(index_error(e)),
    }
}
