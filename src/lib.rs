pub mod config;
pub mod engine;
pub mod extractor;
pub mod models;
pub mod output;
pub mod rules;

// Re-export main types
pub use config::{CliConfig, EngineConfig};
pub use engine::{CliEngine, ContainerEngine, EngineError, EngineErrorKind, ExportedFs};
pub use extractor::{ExtractionError, FactsExtractor};
pub use models::{Builder, CheckResult, CheckState, ImageFacts, TestStatus};
pub use output::{JsonReportWriter, ReportWriter};
pub use rules::{RuleSet, Selection};
