use crate::error::Result;
use crate::models::exam::Exam;
use crate::services::analytics_service::{summarize, CompletedAttempt};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::*;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub struct ExportService;

impl ExportService {
    /// Results workbook: a title band, a summary line, then one row per
    /// completed attempt (newest first).
    pub fn generate_results_xlsx(exam: &Exam, attempts: &[CompletedAttempt]) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Results")?;

        let primary_color = Color::RGB(0x1E293B);
        let header_bg = Color::RGB(0x0F172A);
        let alt_row = Color::RGB(0xF8FAFC);
        let border_color = Color::RGB(0xE2E8F0);
        let passed_color = Color::RGB(0x10B981);
        let failed_color = Color::RGB(0xEF4444);

        let columns = [
            ("#", 6.0),
            ("Name", 30.0),
            ("Email", 32.0),
            ("Started", 20.0),
            ("Completed", 20.0),
            ("Score (%)", 12.0),
            ("Result", 12.0),
        ];
        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }
        let last_col = (columns.len() - 1) as u16;

        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);
        worksheet.set_row_height(0, 36)?;
        worksheet.merge_range(0, 0, 0, last_col, &exam.title, &title_format)?;

        let stats = summarize(exam.id, exam.passing_grade, attempts);
        let summary_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);
        let summary = format!(
            "Exported {}  |  Attempts: {}  |  Passing grade: {}%  |  Pass rate: {}%  |  Average: {}%",
            chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"),
            stats.total_attempts,
            exam.passing_grade,
            stats.pass_rate,
            stats.average_score,
        );
        worksheet.set_row_height(1, 22)?;
        worksheet.merge_range(1, 0, 1, last_col, &summary, &summary_format)?;

        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(Color::White)
            .set_background_color(header_bg)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);
        let header_row = 2;
        worksheet.set_row_height(header_row, 26)?;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_string_with_format(header_row, i as u16, *name, &header_format)?;
        }

        let data_start_row = 3;
        for (idx, attempt) in attempts.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let bg = if idx % 2 == 0 { alt_row } else { Color::White };

            let base_fmt = Format::new()
                .set_font_size(10)
                .set_background_color(bg)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);
            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);
            let score_fmt = center_fmt.clone().set_num_format("0.00");

            let passed = attempt.score >= exam.passing_grade;
            let result_fmt = Format::new()
                .set_font_size(10)
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(if passed { passed_color } else { failed_color })
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);

            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;
            worksheet.write_string_with_format(row, 1, &attempt.user_name, &base_fmt.clone().set_bold())?;
            worksheet.write_string_with_format(row, 2, &attempt.user_email, &base_fmt)?;
            worksheet.write_string_with_format(
                row,
                3,
                attempt.started_at.format("%Y-%m-%d %H:%M").to_string(),
                &center_fmt,
            )?;
            worksheet.write_string_with_format(
                row,
                4,
                attempt.completed_at.format("%Y-%m-%d %H:%M").to_string(),
                &center_fmt,
            )?;
            worksheet.write_number_with_format(row, 5, attempt.score.to_f64().unwrap_or(0.0), &score_fmt)?;
            worksheet.write_string_with_format(row, 6, if passed { "PASSED" } else { "FAILED" }, &result_fmt)?;
        }

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::models::exam::ExamStatus;

    #[test]
    fn builds_a_zip_container() {
        let exam = Exam {
            id: Uuid::new_v4(),
            institution_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            title: "Chemistry final".into(),
            description: None,
            duration_minutes: 90,
            passing_grade: Decimal::from(60),
            max_attempts: 1,
            status: ExamStatus::Closed,
            available_from: None,
            available_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let attempts = vec![CompletedAttempt {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Ada".into(),
            user_email: "ada@school.test".into(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            score: Decimal::new(6667, 2),
        }];

        let bytes = ExportService::generate_results_xlsx(&exam, &attempts).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
