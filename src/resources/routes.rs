use axum::{Router, routing::get};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::list_resources).post(handler::create_resource))
        .route("/new", get(handler::new_resource))
        .route(
            "/:id",
            get(handler::get_resource)
                .put(handler::update_resource)
                .delete(handler::delete_resource),
        )
        .route("/:id/edit", get(handler::edit_resource))
}
