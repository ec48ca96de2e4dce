//! Routes for the organization context.

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use sentinel_org::application::command_handlers::{
    handle_accept_invite, handle_invite_member, handle_remove_member,
};
use sentinel_org::domain::commands::{AcceptInvite, InviteMember, RemoveMember};
use serde::Deserialize;

use crate::error::{ApiError, ok};
use crate::middleware::actor_id;
use crate::routes::{guard_options, invalid_body};
use crate::state::AppState;

/// Body of `POST /{org_id}/invites`.
#[derive(Debug, Deserialize)]
pub struct InviteMemberRequest {
    /// Invitee email.
    pub email: String,
    /// Role granted on acceptance.
    pub role: String,
}

/// Body of `POST /{org_id}/invites/{invite_id}/accept`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInviteRequest {
    /// The user joining.
    pub user_id: String,
}

/// POST /api/v1/orgs/{org_id}/invites
async fn invite_member(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<InviteMemberRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(invalid_body)?;
    let command = InviteMember {
        org_id,
        email: request.email,
        role: request.role,
        actor_id: actor_id(&headers),
    };
    let invite = handle_invite_member(command, &state.org, guard_options(&headers)).await?;
    Ok((StatusCode::CREATED, ok(invite)))
}

/// POST /api/v1/orgs/{org_id}/invites/{invite_id}/accept
async fn accept_invite(
    State(state): State<AppState>,
    Path((org_id, invite_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<AcceptInviteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(invalid_body)?;
    let command = AcceptInvite {
        org_id,
        invite_id,
        user_id: request.user_id,
    };
    let member = handle_accept_invite(command, &state.org, guard_options(&headers)).await?;
    Ok(ok(member))
}

/// DELETE /api/v1/orgs/{org_id}/members/{user_id}
async fn remove_member(
    State(state): State<AppState>,
    Path((org_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let command = RemoveMember {
        org_id,
        user_id,
        actor_id: actor_id(&headers),
    };
    let removed = handle_remove_member(command, &state.org, guard_options(&headers)).await?;
    Ok(ok(removed))
}

/// Returns the router for the organization context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{org_id}/invites", post(invite_member))
        .route("/{org_id}/invites/{invite_id}/accept", post(accept_invite))
        .route("/{org_id}/members/{user_id}", delete(remove_member))
}
