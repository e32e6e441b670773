pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    analytics_service::AnalyticsService, assignment_service::AssignmentService,
    attempt_service::AttemptService, exam_service::ExamService, grading_service::GradingService,
    group_service::GroupService, institution_service::InstitutionService,
    invitation_service::InvitationService, mail_service::MailService,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub exam_service: ExamService,
    pub assignment_service: AssignmentService,
    pub attempt_service: AttemptService,
    pub grading_service: GradingService,
    pub analytics_service: AnalyticsService,
    pub group_service: GroupService,
    pub institution_service: InstitutionService,
    pub invitation_service: InvitationService,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let mail = MailService::new(config.mail_relay_url.clone(), config.mail_from.clone());

        let exam_service = ExamService::new(pool.clone());
        let assignment_service = AssignmentService::new(pool.clone());
        let attempt_service = AttemptService::new(pool.clone());
        let grading_service = GradingService::new(pool.clone());
        let analytics_service = AnalyticsService::new(pool.clone());
        let group_service = GroupService::new(pool.clone());
        let institution_service = InstitutionService::new(pool.clone());
        let invitation_service =
            InvitationService::new(pool.clone(), mail, config.app_base_url.clone());

        Self {
            pool,
            config: Arc::new(config),
            exam_service,
            assignment_service,
            attempt_service,
            grading_service,
            analytics_service,
            group_service,
            institution_service,
            invitation_service,
        }
    }
}
