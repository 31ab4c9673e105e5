pub mod orchestrator;
pub mod prompt;
pub mod report;
pub mod sanitize;

pub use orchestrator::{ReportRequest, generate_report};
pub use report::Report;
