use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::auth::jwt;
use crate::handlers::artifacts;
use crate::state::AppState;

/// Every route sits behind the bearer-token middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/{namespace}/{name}",
            get(artifacts::list_versions).delete(artifacts::delete_artifact),
        )
        .route(
            "/{namespace}/{name}/{version}",
            get(artifacts::download)
                .put(artifacts::upload)
                .delete(artifacts::delete_version),
        )
        .route(
            "/{namespace}/{name}/{version}/{filename}",
            get(artifacts::download_as)
                .put(artifacts::upload_as)
                .delete(artifacts::delete_version_as),
        )
        .layer(middleware::from_fn_with_state(state.clone(), jwt::jwt_middleware))
        .with_state(state)
}
