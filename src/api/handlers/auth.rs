use crate::{
    auth::{CookieJar, CurrentUser, RequestContext, Settings},
    error::Result,
    store::Store,
};
use axum::{
    extract::{Extension, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::{IntoParams, ToSchema};

const ACTION_AUTH: &str = "auth";

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct AuthQuery {
    /// Requested action, only `auth` is served.
    action: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct AuthResponse {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_moderator: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_author: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_editor: Option<bool>,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl AuthResponse {
    fn logged_out(nonce: String) -> Self {
        Self {
            nonce,
            ..Self::default()
        }
    }

    fn logged_in(user: &CurrentUser, nonce: String, fingerprint: String) -> Self {
        Self {
            logged_in: true,
            user_id: Some(user.id),
            login: Some(user.login.clone()),
            display_name: Some(user.display_name.clone()),
            roles: Some(user.roles.clone()),
            is_admin: Some(user.has_cap("manage_options")),
            is_moderator: Some(user.has_cap("moderate_comments")),
            is_author: Some(user.has_cap("publish_posts")),
            is_editor: Some(user.has_cap("edit_others_posts")),
            nonce,
            fingerprint: Some(fingerprint),
        }
    }
}

/// Verify the caller and build the response body.
///
/// # Errors
/// Returns an error if the store fails.
pub async fn authenticate(ctx: &mut RequestContext<'_>) -> Result<AuthResponse> {
    let action = ctx.settings().nonce_action().to_string();

    match ctx.current_user().await? {
        Some(user) => {
            let nonce = ctx.create_nonce(&action, user.id).await?;
            let fingerprint = ctx.fingerprint(user.id).await?;
            Ok(AuthResponse::logged_in(&user, nonce, fingerprint))
        }
        None => {
            let nonce = ctx.create_nonce(&action, 0).await?;
            Ok(AuthResponse::logged_out(nonce))
        }
    }
}

#[utoipa::path(
    get,
    path= "/",
    params(AuthQuery),
    responses (
        (status = 200, description = "Session state of the caller", body = AuthResponse),
        (status = 400, description = "Unknown or missing action"),
        (status = 500, description = "Store failure")
    ),
    tag = "auth",
)]
/// Dispatch a request by its `action` parameter.
#[instrument(skip_all)]
pub async fn auth(
    query: Query<AuthQuery>,
    headers: HeaderMap,
    store: Extension<Arc<dyn Store>>,
    settings: Extension<Arc<Settings>>,
) -> Response {
    let action = settings.hooks().request_action(query.0.action);

    if action.as_deref() != Some(ACTION_AUTH) {
        debug!(action = ?action, "unknown action");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unknown action"})),
        )
            .into_response();
    }

    let cookies = CookieJar::parse(
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    );

    let mut ctx = RequestContext::new(store.0.as_ref(), settings.0.as_ref(), cookies);

    let mut response = match authenticate(&mut ctx).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => {
            error!("Failed to authenticate request: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
                .into_response()
        }
    };

    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
