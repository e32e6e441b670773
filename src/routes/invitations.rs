use crate::{
    dto::invitation_dto::{AcceptInvitationPayload, CreateInvitationPayload},
    error::Result,
    middleware::auth::AuthUser,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

#[utoipa::path(
    post,
    path = "/api/invitations",
    request_body = CreateInvitationPayload,
    responses(
        (status = 201, description = "Invitation created and mailed"),
        (status = 403, description = "Role may not invite this role"),
    ),
    tag = "invitations"
)]
#[axum::debug_handler]
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateInvitationPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let created = state
        .invitation_service
        .create_invitation(&user, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[axum::debug_handler]
pub async fn list_invitations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let invitations = state.invitation_service.list_pending(&user).await?;
    Ok(Json(invitations))
}

#[axum::debug_handler]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.invitation_service.revoke(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/invitations/accept",
    request_body = AcceptInvitationPayload,
    responses(
        (status = 200, description = "Invitation accepted; membership created"),
        (status = 400, description = "Invitation expired or already used"),
        (status = 404, description = "Unknown token"),
        (status = 409, description = "Already a member"),
    ),
    tag = "invitations"
)]
#[axum::debug_handler]
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(payload): Json<AcceptInvitationPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let accepted = state.invitation_service.accept(payload).await?;
    Ok(Json(accepted))
}
