use crate::{dto::institution_dto::RegisterInstitutionPayload, error::Result, AppState};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

#[utoipa::path(
    post,
    path = "/api/institutions",
    request_body = RegisterInstitutionPayload,
    responses(
        (status = 201, description = "Institution and its first admin created"),
        (status = 400, description = "Invalid registration fields"),
        (status = 409, description = "Email already registered"),
    ),
    tag = "institutions"
)]
#[axum::debug_handler]
pub async fn register_institution(
    State(state): State<AppState>,
    Json(payload): Json<RegisterInstitutionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let registered = state.institution_service.register(payload).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}
