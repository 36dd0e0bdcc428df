use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::TestStatus;

use super::ReportWriter;

/// Writes the report as indented JSON followed by a newline
pub struct JsonReportWriter<W: Write> {
    out: W,
}

impl JsonReportWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportWriter for JsonReportWriter<W> {
    fn write_report(&mut self, report: &TestStatus) -> Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut self.out, formatter);
        report
            .serialize(&mut ser)
            .context("Failed to serialize report")?;
        self.out.write_all(b"\n")?;
        self.out.flush().context("Failed to flush report")
    }
}
