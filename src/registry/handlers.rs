use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use super::service::MembershipRegistry;
use super::types::{
    AddResponse, LocateResponse, NeighborsResponse, NodeRecord, NodesResponse, RemoveResponse,
};
use crate::hashspace::{position, RingId};

/// The administrative surface. Thin by design: every handler delegates to the
/// same `join`/`leave`/`locate` operations the protocol path uses.
pub fn router(registry: Arc<MembershipRegistry>) -> Router {
    Router::new()
        .route("/ns/add/:address", post(handle_add_node))
        .route("/ns/remove/:address", delete(handle_remove_node))
        .route("/ns/file/:filename", get(handle_locate_file))
        .route("/ns/nodes", get(handle_list_nodes))
        .route("/ns/node/:id", get(handle_node_lookup))
        .route("/ns/neighbors/:address", get(handle_neighbors))
        .layer(Extension(registry))
}

async fn handle_add_node(
    Extension(registry): Extension<Arc<MembershipRegistry>>,
    Path(address): Path<String>,
) -> (StatusCode, Json<AddResponse>) {
    let outcome = registry.join(&address);
    (
        StatusCode::OK,
        Json(AddResponse {
            added: outcome.added,
            ring_size: outcome.ring_size,
        }),
    )
}

async fn handle_remove_node(
    Extension(registry): Extension<Arc<MembershipRegistry>>,
    Path(address): Path<String>,
) -> (StatusCode, Json<RemoveResponse>) {
    let removed = registry.leave(&address);
    (StatusCode::OK, Json(RemoveResponse { removed }))
}

async fn handle_locate_file(
    Extension(registry): Extension<Arc<MembershipRegistry>>,
    Path(filename): Path<String>,
) -> Result<Json<LocateResponse>, StatusCode> {
    let file_hash = position(&filename);
    match registry.locate(file_hash) {
        Ok(node) => Ok(Json(LocateResponse {
            filename,
            file_hash,
            node,
        })),
        // EmptyRing: nothing registered yet.
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

async fn handle_list_nodes(
    Extension(registry): Extension<Arc<MembershipRegistry>>,
) -> Json<NodesResponse> {
    let nodes = registry
        .ring_ids()
        .into_iter()
        .filter_map(|id| registry.record_of(id))
        .collect();
    Json(NodesResponse { nodes })
}

async fn handle_node_lookup(
    Extension(registry): Extension<Arc<MembershipRegistry>>,
    Path(id): Path<RingId>,
) -> Result<Json<NodeRecord>, StatusCode> {
    registry.record_of(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn handle_neighbors(
    Extension(registry): Extension<Arc<MembershipRegistry>>,
    Path(address): Path<String>,
) -> Result<Json<NeighborsResponse>, StatusCode> {
    let (node, predecessor, successor) = registry
        .neighbors_of(&address)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(NeighborsResponse {
        node,
        predecessor,
        successor,
    }))
}
