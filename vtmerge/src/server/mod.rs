//! HTTP gateway.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | redirect to `/data.json` |
//! | `GET /data.json` | datasets served on the request host |
//! | `GET /data/{id}.json` | merged TileJSON |
//! | `GET /data/{id}/{z}/{x}/{y}.pbf` | merged vector tile |
//!
//! Datasets are selected by the public host of the request (see
//! [`public_host`]). Request headers and query strings are forwarded to the
//! upstream sources.

mod forwarded;

pub use forwarded::{public_host, PublicAddress};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::coord::TileCoord;
use crate::merge::metadata::merged_metadata;
use crate::merge::{merge_tile, MergeConfig, MergeError, MergedTile};
use crate::source::RequestContext;

/// Media type of served tiles.
pub const TILE_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// The tile address is not a valid tile.
    #[error("bad tile address: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Merge(MergeError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Merge(MergeError::UpstreamUnavailable { status, .. }) => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::Merge(MergeError::DecodeFailure { .. })
            | ApiError::Merge(MergeError::UnsupportedGeometry { .. }) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<GatewayConfig>,
}

/// Builds the gateway router.
pub fn router(config: Arc<GatewayConfig>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/data.json", get(datasets))
        .route("/data/:dataset", get(tilejson))
        .route("/data/:dataset/:z/:x/:tile", get(tile))
        .with_state(AppState { config })
}

/// Serves the gateway until `shutdown` resolves.
pub async fn serve(
    config: Arc<GatewayConfig>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Gateway listening");
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn root() -> Redirect {
    Redirect::temporary("/data.json")
}

#[derive(Debug, Serialize)]
struct DatasetEntry {
    id: String,
    url: String,
}

async fn datasets(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DatasetEntry>>, ApiError> {
    let address = PublicAddress::from_headers(&headers);
    let ids = address
        .as_ref()
        .and_then(|a| state.config.dataset_ids(&a.host))
        .ok_or_else(|| MergeError::NotFound("no datasets for this host".to_string()))?;
    let base = address.as_ref().map(|a| a.url("")).unwrap_or_default();

    let entries = ids
        .map(|id| DatasetEntry {
            id: id.to_string(),
            url: format!("{}{}/data/{}.json", base, state.config.public_base_path(), id),
        })
        .collect();
    Ok(Json(entries))
}

/// Resolves the dataset for a request, or `NotFound`.
fn lookup<'a>(state: &'a AppState, headers: &HeaderMap, id: &str) -> Result<&'a MergeConfig, ApiError> {
    public_host(headers)
        .and_then(|host| state.config.dataset(&host, id))
        .map(|dataset| dataset.as_ref())
        .ok_or_else(|| ApiError::Merge(MergeError::NotFound(id.to_string())))
}

async fn tilejson(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id = dataset
        .strip_suffix(".json")
        .ok_or_else(|| MergeError::NotFound(dataset.clone()))?;
    let config = lookup(&state, &headers, id)?;

    let address = PublicAddress::from_headers(&headers);
    let path = format!(
        "{}/data/{}/{{z}}/{{x}}/{{y}}.pbf",
        state.config.public_base_path(),
        id
    );
    let prefixes = state.config.public_tile_url_prefixes();
    let tile_urls: Vec<String> = match &address {
        Some(address) if prefixes.is_empty() => vec![format!("{}{}", address.url(""), path)],
        Some(address) => prefixes
            .iter()
            .map(|prefix| format!("{}{}", address.url(prefix), path))
            .collect(),
        None => vec![path],
    };

    let ctx = RequestContext::new(headers, query);
    let document = merged_metadata(config, &tile_urls, &ctx).await?;
    Ok(Json(document).into_response())
}

async fn tile(
    State(state): State<AppState>,
    Path((dataset, z, x, y)): Path<(String, String, String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let y = y
        .strip_suffix(".pbf")
        .ok_or_else(|| MergeError::NotFound(format!("{}/{}/{}/{}", dataset, z, x, y)))?;
    let coord = parse_coord(&z, &x, y)?;
    let config = lookup(&state, &headers, &dataset)?;

    let ctx = RequestContext::new(headers, query);
    let merged = merge_tile(config, coord, &ctx).await?;
    debug!(
        dataset = %dataset,
        tile = %coord,
        passthrough = matches!(merged, MergedTile::Passthrough(_)),
        "Tile served"
    );

    match merged.into_bytes() {
        Some(bytes) => Ok((
            [(header::CONTENT_TYPE, HeaderValue::from_static(TILE_CONTENT_TYPE))],
            bytes,
        )
            .into_response()),
        None => Err(MergeError::NotFound(format!("{}/{}", dataset, coord)).into()),
    }
}

fn parse_coord(z: &str, x: &str, y: &str) -> Result<TileCoord, ApiError> {
    let bad = || ApiError::BadRequest(format!("{}/{}/{}", z, x, y));
    let z: u8 = z.parse().map_err(|_| bad())?;
    let x: u32 = x.parse().map_err(|_| bad())?;
    let y: u32 = y.parse().map_err(|_| bad())?;
    TileCoord::checked(z, x, y).map_err(|e| ApiError::BadRequest(e.to_string()))
}
