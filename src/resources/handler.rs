//! HTTP handlers for resources.
//!
//! Mutations answer with `303 See Other` on success. A validation failure re-renders
//! the originating form as `422` with the attempted input; a denied action redirects
//! home with the unauthorized notice.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use super::{Resource, ResourceParams, Resources};
use crate::error::{CatalogError, Result};
use crate::guard::{Action, authorize};
use crate::handler::AppState;
use crate::session::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i32>,
    pub offset: Option<i32>,
    pub book_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceApiResponse<T> {
    pub data: T,
}

/// A form to fill in, or to correct after a failed submit.
#[derive(Debug, Serialize, Deserialize)]
pub struct FormResponse {
    pub form: String,
    pub id: Option<i32>,
    pub resource: ResourceParams,
    pub errors: Vec<String>,
}

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ResourceApiResponse { data })).into_response()
}

fn form(status: StatusCode, name: &str, id: Option<i32>, resource: ResourceParams, errors: Vec<String>) -> Response {
    (
        status,
        Json(FormResponse {
            form: name.to_string(),
            id,
            resource,
            errors,
        }),
    )
        .into_response()
}

/// Loads the target and checks the actor may perform `action` on it.
/// Missing and foreign resources are denied alike.
async fn authorized_resource(
    store: &Resources<'_>,
    actor: &CurrentUser,
    id: i32,
    action: Action,
) -> Result<Resource> {
    let resource = store.get(id).await?;
    authorize(actor.user(), resource.as_ref().map(|r| r.user_id), action).into_result()?;
    resource.ok_or(CatalogError::Unauthorized)
}

pub async fn list_resources(
    State(state): State<AppState>,
    actor: CurrentUser,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(e) = authorize(actor.user(), None, Action::Index).into_result() {
        return e.into_response();
    }

    let store = Resources::new(&state.db);
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    match store.list(limit, offset, params.book_id).await {
        Ok(resources) => success(resources),
        Err(e) => {
            tracing::error!("failed to list resources: {}", e);
            e.into_response()
        }
    }
}

pub async fn get_resource(State(state): State<AppState>, actor: CurrentUser, Path(id): Path<i32>) -> Response {
    let store = Resources::new(&state.db);

    match store.get(id).await {
        Ok(Some(resource)) => match authorize(actor.user(), Some(resource.user_id), Action::Show).into_result() {
            Ok(()) => success(resource),
            Err(e) => e.into_response(),
        },
        Ok(None) => CatalogError::NotFound("resource").into_response(),
        Err(e) => {
            tracing::error!("failed to get resource {}: {}", id, e);
            e.into_response()
        }
    }
}

pub async fn new_resource(actor: CurrentUser) -> Response {
    if let Err(e) = authorize(actor.user(), None, Action::New).into_result() {
        tracing::info!("anonymous request for new resource form denied");
        return e.into_response();
    }

    form(StatusCode::OK, "new", None, ResourceParams::default(), vec![])
}

pub async fn create_resource(
    State(state): State<AppState>,
    actor: CurrentUser,
    payload: Option<Json<ResourceParams>>,
) -> Response {
    if let Err(e) = authorize(actor.user(), None, Action::Create).into_result() {
        tracing::info!("anonymous create resource denied");
        return e.into_response();
    }
    let Some(user) = actor.user() else {
        return CatalogError::Unauthorized.into_response();
    };

    let params = payload.map(|Json(p)| p).unwrap_or_default();
    let store = Resources::new(&state.db);

    match store.create(user.id, &params).await {
        Ok(resource) => Redirect::to(&format!("/books/{}", resource.book_id)).into_response(),
        Err(CatalogError::Validation(errors)) => {
            tracing::info!(user_id = user.id, ?errors, "resource rejected");
            form(StatusCode::UNPROCESSABLE_ENTITY, "new", None, params, errors)
        }
        Err(e) => e.into_response(),
    }
}

pub async fn edit_resource(State(state): State<AppState>, actor: CurrentUser, Path(id): Path<i32>) -> Response {
    let store = Resources::new(&state.db);

    match authorized_resource(&store, &actor, id, Action::Edit).await {
        Ok(resource) => form(
            StatusCode::OK,
            "edit",
            Some(resource.id),
            ResourceParams::from_resource(&resource),
            vec![],
        ),
        Err(e) => {
            tracing::info!(id, "edit resource: {}", e);
            e.into_response()
        }
    }
}

pub async fn update_resource(
    State(state): State<AppState>,
    actor: CurrentUser,
    Path(id): Path<i32>,
    payload: Option<Json<ResourceParams>>,
) -> Response {
    let store = Resources::new(&state.db);

    let resource = match authorized_resource(&store, &actor, id, Action::Update).await {
        Ok(resource) => resource,
        Err(e) => {
            tracing::info!(id, "update resource: {}", e);
            return e.into_response();
        }
    };

    let params = payload.map(|Json(p)| p).unwrap_or_default();

    match store.update(resource.id, &params).await {
        Ok(Some(updated)) => Redirect::to(&format!("/resources/{}", updated.id)).into_response(),
        Ok(None) => CatalogError::NotFound("resource").into_response(),
        Err(CatalogError::Validation(errors)) => {
            form(StatusCode::UNPROCESSABLE_ENTITY, "edit", Some(resource.id), params, errors)
        }
        Err(e) => e.into_response(),
    }
}

pub async fn delete_resource(State(state): State<AppState>, actor: CurrentUser, Path(id): Path<i32>) -> Response {
    let store = Resources::new(&state.db);

    let resource = match authorized_resource(&store, &actor, id, Action::Destroy).await {
        Ok(resource) => resource,
        Err(e) => {
            tracing::info!(id, "delete resource: {}", e);
            return e.into_response();
        }
    };

    match store.delete(resource.id).await {
        Ok(_) => Redirect::to("/resources").into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FLASH_COOKIE;
    use crate::locale::t;
    use crate::testing::{self, TestApp};
    use axum::http::header;

    async fn setup() -> (TestApp, i32, String, String, Resource) {
        let app = TestApp::new().await;
        let book_id = testing::insert_bare_book(&app.db, "Dune").await;
        let (owner, owner_token) = testing::signed_in(&app.db, "owner@example.com").await;
        let (_, other_token) = testing::signed_in(&app.db, "other@example.com").await;
        let resource = testing::insert_resource(&app.db, book_id, owner.id).await;
        (app, book_id, owner_token, other_token, resource)
    }

    fn valid_body(book_id: i32) -> String {
        serde_json::json!({
            "book_id": book_id,
            "title": "Study guide",
            "link": "https://example.com/guide"
        })
        .to_string()
    }

    fn assert_denied(response: &Response) {
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        let expected = format!("{}={}", FLASH_COOKIE, urlencoding::encode(&t("unauthorized.default")));
        assert!(cookie.starts_with(&expected), "unexpected cookie {}", cookie);
    }

    async fn count(app: &TestApp) -> i64 {
        Resources::new(&app.db).count().await.unwrap()
    }

    #[tokio::test]
    async fn index_and_show_are_public() {
        let (app, _, _, _, resource) = setup().await;

        let response = app.request("GET", "/resources", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: ResourceApiResponse<Vec<Resource>> = testing::json(response).await;
        assert_eq!(body.data, vec![resource.clone()]);

        let response = app.request("GET", &format!("/resources/{}", resource.id), None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.request("GET", "/resources/999", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn index_and_show_allow_any_signed_in_reader() {
        let (app, _, _, other, resource) = setup().await;

        let response = app.request("GET", "/resources", Some(&other), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .request("GET", &format!("/resources/{}", resource.id), Some(&other), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: ResourceApiResponse<Resource> = testing::json(response).await;
        assert_eq!(body.data, resource);
    }

    #[tokio::test]
    async fn new_form_requires_sign_in() {
        let (app, _, owner, _, _) = setup().await;

        let response = app.request("GET", "/resources/new", None, None).await;
        assert_denied(&response);

        let response = app.request("GET", "/resources/new", Some(&owner), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: FormResponse = testing::json(response).await;
        assert_eq!(body.form, "new");
    }

    #[tokio::test]
    async fn create_redirects_to_book_and_counts_one() {
        let (app, book_id, owner, _, _) = setup().await;
        let before = count(&app).await;

        let response = app
            .request("POST", "/resources", Some(&owner), Some(valid_body(book_id)))
            .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], format!("/books/{}", book_id).as_str());
        assert_eq!(count(&app).await, before + 1);
    }

    #[tokio::test]
    async fn invalid_create_rerenders_new_form() {
        let (app, book_id, owner, _, _) = setup().await;
        let before = count(&app).await;
        let body = serde_json::json!({ "book_id": book_id, "title": "", "link": "x" }).to_string();

        let response = app.request("POST", "/resources", Some(&owner), Some(body)).await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let form: FormResponse = testing::json(response).await;
        assert_eq!(form.form, "new");
        assert_eq!(form.resource.link, "x");
        assert_eq!(form.errors, vec![t("resources.title_blank")]);
        assert_eq!(count(&app).await, before);
    }

    #[tokio::test]
    async fn anonymous_create_is_redirected() {
        let (app, book_id, _, _, _) = setup().await;
        let before = count(&app).await;

        let response = app.request("POST", "/resources", None, None).await;
        assert_denied(&response);

        let response = app.request("POST", "/resources", None, Some(valid_body(book_id))).await;
        assert_denied(&response);
        assert_eq!(count(&app).await, before);
    }

    #[tokio::test]
    async fn edit_is_owner_only() {
        let (app, _, owner, other, resource) = setup().await;
        let path = format!("/resources/{}/edit", resource.id);

        assert_denied(&app.request("GET", &path, None, None).await);
        assert_denied(&app.request("GET", &path, Some(&other), None).await);
        assert_denied(&app.request("GET", "/resources/999/edit", Some(&owner), None).await);

        let response = app.request("GET", &path, Some(&owner), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let form: FormResponse = testing::json(response).await;
        assert_eq!(form.form, "edit");
        assert_eq!(form.id, Some(resource.id));
        assert_eq!(form.resource.title, resource.title);
    }

    #[tokio::test]
    async fn update_redirects_to_resource() {
        let (app, _, owner, _, resource) = setup().await;
        let path = format!("/resources/{}", resource.id);
        let body = serde_json::json!({ "title": "Revised", "link": "https://example.com/v2" }).to_string();

        let response = app.request("PUT", &path, Some(&owner), Some(body)).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], path.as_str());
        let stored = Resources::new(&app.db).get(resource.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Revised");
        assert_eq!(stored.user_id, resource.user_id);
    }

    #[tokio::test]
    async fn invalid_update_rerenders_edit_form() {
        let (app, _, owner, _, resource) = setup().await;
        let body = serde_json::json!({ "title": "Revised", "link": "" }).to_string();

        let response = app
            .request("PUT", &format!("/resources/{}", resource.id), Some(&owner), Some(body))
            .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let form: FormResponse = testing::json(response).await;
        assert_eq!(form.form, "edit");
        assert_eq!(form.id, Some(resource.id));
        assert_eq!(form.resource.title, "Revised");
        let stored = Resources::new(&app.db).get(resource.id).await.unwrap().unwrap();
        assert_eq!(stored, resource);
    }

    #[tokio::test]
    async fn update_by_anonymous_or_other_is_denied() {
        let (app, _, _, other, resource) = setup().await;
        let path = format!("/resources/{}", resource.id);
        let body = serde_json::json!({ "title": "Hijack", "link": "https://evil.example" }).to_string();

        assert_denied(&app.request("PUT", &path, None, Some(body.clone())).await);
        assert_denied(&app.request("PUT", &path, Some(&other), Some(body)).await);

        let stored = Resources::new(&app.db).get(resource.id).await.unwrap().unwrap();
        assert_eq!(stored.title, resource.title);
    }

    #[tokio::test]
    async fn destroy_is_owner_only() {
        let (app, _, owner, other, resource) = setup().await;
        let path = format!("/resources/{}", resource.id);
        let before = count(&app).await;

        assert_denied(&app.request("DELETE", &path, None, None).await);
        assert_denied(&app.request("DELETE", &path, Some(&other), None).await);
        assert_eq!(count(&app).await, before);

        let response = app.request("DELETE", &path, Some(&owner), None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/resources");
        assert_eq!(count(&app).await, before - 1);
    }
}
