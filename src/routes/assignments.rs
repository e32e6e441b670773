use crate::{
    dto::assignment_dto::CreateAssignmentPayload, error::Result, middleware::auth::AuthUser,
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/exams/{id}/assignments",
    params(("id" = Uuid, Path, description = "Exam ID")),
    request_body = CreateAssignmentPayload,
    responses(
        (status = 201, description = "Exam assigned to a user or a group"),
        (status = 400, description = "Invalid target or window"),
        (status = 409, description = "Target already assigned"),
    ),
    tag = "exams"
)]
#[axum::debug_handler]
pub async fn create_assignment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateAssignmentPayload>,
) -> Result<impl IntoResponse> {
    let assignment = state
        .assignment_service
        .create_assignment(&user, id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

#[axum::debug_handler]
pub async fn list_assignments(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let assignments = state.assignment_service.list_assignments(&user, id).await?;
    Ok(Json(assignments))
}

#[axum::debug_handler]
pub async fn remove_assignment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((id, assignment_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .assignment_service
        .remove_assignment(&user, id, assignment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
