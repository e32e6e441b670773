use crate::{
    dto::attempt_dto::{GradeAnswerPayload, SubmitAnswersRequest},
    error::Result,
    middleware::auth::AuthUser,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

#[utoipa::path(
    put,
    path = "/api/exams/attempts/{attempt_id}/answers",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    request_body = SubmitAnswersRequest,
    responses(
        (status = 200, description = "Answers stored; attempt stays in progress"),
        (status = 400, description = "Attempt completed or question not in exam"),
        (status = 403, description = "Attempt belongs to another user"),
    ),
    tag = "attempts"
)]
#[axum::debug_handler]
pub async fn save_answers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let saved = state
        .attempt_service
        .save_answers(&user, attempt_id, payload.answers)
        .await?;
    Ok(Json(saved))
}

#[utoipa::path(
    post,
    path = "/api/exams/attempts/{attempt_id}/submit",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    request_body = SubmitAnswersRequest,
    responses(
        (status = 200, description = "Attempt completed and auto-graded"),
        (status = 400, description = "Attempt completed or question not in exam"),
        (status = 403, description = "Attempt belongs to another user"),
        (status = 404, description = "Attempt not found"),
    ),
    tag = "attempts"
)]
#[axum::debug_handler]
pub async fn submit_answers(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let submitted = state
        .attempt_service
        .submit_answers(&user, attempt_id, payload.answers)
        .await?;
    Ok(Json(submitted))
}

#[utoipa::path(
    get,
    path = "/api/exams/attempts/{attempt_id}",
    params(("attempt_id" = Uuid, Path, description = "Attempt ID")),
    responses(
        (status = 200, description = "Attempt with answers and exam"),
        (status = 403, description = "Not the owner, creator or an institution admin"),
        (status = 404, description = "Attempt not found"),
    ),
    tag = "attempts"
)]
#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state.attempt_service.get_attempt(&user, attempt_id).await?;
    Ok(Json(attempt))
}

#[utoipa::path(
    post,
    path = "/api/exams/attempts/{attempt_id}/answers/{question_id}/grade",
    params(
        ("attempt_id" = Uuid, Path, description = "Attempt ID"),
        ("question_id" = Uuid, Path, description = "Question ID"),
    ),
    request_body = GradeAnswerPayload,
    responses(
        (status = 200, description = "Answer graded; attempt score recomputed when fully graded"),
        (status = 400, description = "Score out of range or attempt not completed"),
        (status = 403, description = "Only the exam creator or an institution admin"),
        (status = 404, description = "Attempt, question or answer not found"),
    ),
    tag = "grading"
)]
#[axum::debug_handler]
pub async fn grade_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<GradeAnswerPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let graded = state
        .grading_service
        .grade_answer(&user, attempt_id, question_id, payload)
        .await?;
    Ok(Json(graded))
}
