use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::node::DistributedStorageNode;
use super::protocol::{FetchAtomResponse, StoreAtomRequest, StoreAtomResponse};
use super::types::StorageStats;
use crate::atom::Handle;

pub async fn handle_stats(
    Extension(node): Extension<Arc<DistributedStorageNode>>,
) -> Json<StorageStats> {
    Json(node.stats())
}

pub async fn handle_get_atom(
    Extension(node): Extension<Arc<DistributedStorageNode>>,
    Path(handle_str): Path<String>,
) -> (StatusCode, Json<FetchAtomResponse>) {
    let handle: Handle = match handle_str.parse() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!("Invalid atom handle '{}': {}", handle_str, e);
            return (StatusCode::BAD_REQUEST, Json(FetchAtomResponse { atom: None }));
        }
    };

    match node.fetch(&handle).await {
        Some(atom) => (StatusCode::OK, Json(FetchAtomResponse { atom: Some(atom) })),
        None => (StatusCode::NOT_FOUND, Json(FetchAtomResponse { atom: None })),
    }
}

pub async fn handle_store_atom(
    Extension(node): Extension<Arc<DistributedStorageNode>>,
    Json(req): Json<StoreAtomRequest>,
) -> (StatusCode, Json<StoreAtomResponse>) {
    let Some(atom) = req.into_atom() else {
        tracing::warn!("Rejected atom request: exactly one of name/outgoing is required");
        return (
            StatusCode::BAD_REQUEST,
            Json(StoreAtomResponse {
                success: false,
                handle: None,
            }),
        );
    };

    let handle = atom.handle;
    if node.store(&atom).await {
        (
            StatusCode::OK,
            Json(StoreAtomResponse {
                success: true,
                handle: Some(handle),
            }),
        )
    } else {
        tracing::error!("Failed to store atom {}", handle);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StoreAtomResponse {
                success: false,
                handle: Some(handle),
            }),
        )
    }
}
