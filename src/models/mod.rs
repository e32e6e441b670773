pub mod answer;
pub mod assignment;
pub mod attempt;
pub mod audit_log;
pub mod exam;
pub mod group;
pub mod institution;
pub mod invitation;
pub mod question;
pub mod user;

/// Raised when a TEXT column holds a value outside its enum.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
