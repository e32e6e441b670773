use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension,
};
use uuid::Uuid;

use crate::services::export_service::{ExportService, XLSX_CONTENT_TYPE};
use crate::{error::Result, middleware::auth::AuthUser, AppState};

/// File name stem from the exam title: alphanumerics kept, everything else `_`.
fn file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "exam".to_string()
    } else {
        stem
    }
}

/// Export an exam's completed attempts as XLSX
#[utoipa::path(
    get,
    path = "/api/exams/{id}/results/export",
    params(("id" = Uuid, Path, description = "Exam ID")),
    responses(
        (status = 200, description = "XLSX workbook of completed attempts"),
        (status = 403, description = "Only the exam creator or an institution admin"),
    ),
    tag = "exams"
)]
#[axum::debug_handler]
pub async fn export_results(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (exam, attempts) = state.analytics_service.results(&user, id).await?;
    let buffer = ExportService::generate_results_xlsx(&exam, &attempts)?;

    let filename = format!(
        "results_{}_{}.xlsx",
        file_stem(&exam.title),
        chrono::Utc::now().format("%Y%m%d")
    );
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stem_is_header_safe() {
        assert_eq!(file_stem("Algebra 1: \"Final\""), "Algebra_1___Final_");
        assert_eq!(file_stem("   "), "exam");
    }
}
