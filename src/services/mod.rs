pub mod analytics_service;
pub mod assignment_service;
pub mod attempt_service;
pub mod audit_service;
pub mod exam_service;
pub mod export_service;
pub mod grading_service;
pub mod group_service;
pub mod institution_service;
pub mod invitation_service;
pub mod mail_service;
