pub mod json;

pub use json::JsonReportWriter;

use anyhow::Result;

use crate::models::TestStatus;

/// Trait for emitting the final report
pub trait ReportWriter {
    /// Write one complete report document
    fn write_report(&mut self, report: &TestStatus) -> Result<()>;
}
