//! Business logic services.

pub mod retention;
pub mod submission;

pub use retention::RetentionSweeper;
pub use submission::SubmissionGateway;
