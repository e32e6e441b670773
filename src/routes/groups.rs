use crate::{
    dto::group_dto::{AddMemberPayload, CreateGroupPayload},
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

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateGroupPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let group = state.group_service.create_group(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

#[axum::debug_handler]
pub async fn list_groups(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let groups = state.group_service.list_groups(&user).await?;
    Ok(Json(groups))
}

#[axum::debug_handler]
pub async fn get_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let group = state.group_service.get_group(&user, id).await?;
    Ok(Json(group))
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.group_service.delete_group(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddMemberPayload>,
) -> Result<impl IntoResponse> {
    let member = state.group_service.add_member(&user, id, payload.user_id).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

#[axum::debug_handler]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state.group_service.remove_member(&user, id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
