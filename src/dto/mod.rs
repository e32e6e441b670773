pub mod assignment_dto;
pub mod attempt_dto;
pub mod exam_dto;
pub mod group_dto;
pub mod institution_dto;
pub mod invitation_dto;
