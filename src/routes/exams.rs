use crate::{
    dto::exam_dto::{CreateExamPayload, ListAttemptsQuery, UpdateExamPayload},
    error::Result,
    middleware::auth::AuthUser,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/exams",
    request_body = CreateExamPayload,
    responses(
        (status = 201, description = "Draft exam created with its questions"),
        (status = 400, description = "Invalid exam or question fields"),
        (status = 403, description = "Examiner or admin role required"),
    ),
    tag = "exams"
)]
#[axum::debug_handler]
pub async fn create_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateExamPayload>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.create_exam(&user, payload).await?;
    Ok((StatusCode::CREATED, Json(exam)))
}

#[axum::debug_handler]
pub async fn list_exams(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let exams = state.exam_service.list_exams(&user).await?;
    Ok(Json(exams))
}

#[utoipa::path(
    get,
    path = "/api/exams/{id}",
    params(("id" = Uuid, Path, description = "Exam ID")),
    responses(
        (status = 200, description = "Exam with questions; correct answers only for staff"),
        (status = 403, description = "Not staff and not assigned"),
        (status = 404, description = "Exam not found"),
    ),
    tag = "exams"
)]
#[axum::debug_handler]
pub async fn get_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.get_exam(&user, id).await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn update_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateExamPayload>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.update_exam(&user, id, payload).await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn delete_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.exam_service.delete_exam(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/exams/{id}/publish",
    params(("id" = Uuid, Path, description = "Exam ID")),
    responses(
        (status = 200, description = "Exam published"),
        (status = 400, description = "Exam is not a draft or has no questions"),
    ),
    tag = "exams"
)]
#[axum::debug_handler]
pub async fn publish_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.publish(&user, id).await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn unpublish_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.unpublish(&user, id).await?;
    Ok(Json(exam))
}

#[axum::debug_handler]
pub async fn close_exam(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let exam = state.exam_service.close(&user, id).await?;
    Ok(Json(exam))
}

#[utoipa::path(
    post,
    path = "/api/exams/{id}/start",
    params(("id" = Uuid, Path, description = "Exam ID")),
    responses(
        (status = 201, description = "Attempt created; questions returned without correct answers"),
        (status = 400, description = "Exam not published, outside its window, or attempts exhausted"),
        (status = 403, description = "Caller is not assigned to the exam"),
        (status = 404, description = "Exam not found"),
    ),
    tag = "attempts"
)]
#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let started = state.attempt_service.start_attempt(&user, id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

#[utoipa::path(
    get,
    path = "/api/exams/{id}/analytics",
    params(("id" = Uuid, Path, description = "Exam ID")),
    responses(
        (status = 200, description = "Pass rate, mean, extremes and recent attempts"),
        (status = 403, description = "Only the exam creator or an institution admin"),
        (status = 404, description = "Exam not found"),
    ),
    tag = "exams"
)]
#[axum::debug_handler]
pub async fn exam_analytics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let analytics = state.analytics_service.exam_analytics(&user, id).await?;
    Ok(Json(analytics))
}

#[axum::debug_handler]
pub async fn list_exam_attempts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<impl IntoResponse> {
    let attempts = state
        .attempt_service
        .list_exam_attempts(&user, id, query.status)
        .await?;
    Ok(Json(attempts))
}
