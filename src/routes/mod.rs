pub mod assignments;
pub mod attempts;
pub mod exams;
pub mod export;
pub mod groups;
pub mod health;
pub mod institutions;
pub mod invitations;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::middleware::{
    auth::require_auth,
    cors::cors_layer,
    rate_limit::{rps_middleware, RateLimiter},
};
use crate::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        institutions::register_institution,
        invitations::create_invitation,
        invitations::accept_invitation,
        exams::create_exam,
        exams::get_exam,
        exams::publish_exam,
        exams::start_attempt,
        exams::exam_analytics,
        assignments::create_assignment,
        attempts::save_answers,
        attempts::submit_answers,
        attempts::get_attempt,
        attempts::grade_answer,
        export::export_results,
    ),
    tags(
        (name = "exams", description = "Exam authoring, assignment and analytics"),
        (name = "attempts", description = "Taking an exam"),
        (name = "grading", description = "Manual grading"),
        (name = "invitations", description = "Institution invitations"),
        (name = "institutions", description = "Institution registration"),
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

pub fn build_router(state: AppState) -> Router {
    let public_api = Router::new()
        .route("/api/institutions", post(institutions::register_institution))
        .route("/api/invitations/accept", post(invitations::accept_invitation));

    let protected_api = Router::new()
        .route(
            "/api/invitations",
            get(invitations::list_invitations).post(invitations::create_invitation),
        )
        .route("/api/invitations/:id", delete(invitations::revoke_invitation))
        .route("/api/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/api/groups/:id",
            get(groups::get_group).delete(groups::delete_group),
        )
        .route("/api/groups/:id/members", post(groups::add_member))
        .route(
            "/api/groups/:id/members/:user_id",
            delete(groups::remove_member),
        )
        .route("/api/exams", get(exams::list_exams).post(exams::create_exam))
        .route(
            "/api/exams/:id",
            get(exams::get_exam)
                .put(exams::update_exam)
                .delete(exams::delete_exam),
        )
        .route("/api/exams/:id/publish", post(exams::publish_exam))
        .route("/api/exams/:id/unpublish", post(exams::unpublish_exam))
        .route("/api/exams/:id/close", post(exams::close_exam))
        .route(
            "/api/exams/:id/assignments",
            get(assignments::list_assignments).post(assignments::create_assignment),
        )
        .route(
            "/api/exams/:id/assignments/:assignment_id",
            delete(assignments::remove_assignment),
        )
        .route("/api/exams/:id/start", post(exams::start_attempt))
        .route("/api/exams/:id/analytics", get(exams::exam_analytics))
        .route("/api/exams/:id/attempts", get(exams::list_exam_attempts))
        .route("/api/exams/:id/results/export", get(export::export_results))
        .route(
            "/api/exams/attempts/:attempt_id",
            get(attempts::get_attempt),
        )
        .route(
            "/api/exams/attempts/:attempt_id/answers",
            put(attempts::save_answers),
        )
        .route(
            "/api/exams/attempts/:attempt_id/submit",
            post(attempts::submit_answers),
        )
        .route(
            "/api/exams/attempts/:attempt_id/answers/:question_id/grade",
            post(attempts::grade_answer),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = public_api
        .merge(protected_api)
        .layer(from_fn_with_state(
            RateLimiter::per_second(state.config.api_rps),
            rps_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/openapi.json", get(openapi_json))
        .merge(api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
