pub mod facts;
pub mod result;

pub use facts::{Builder, FactsBuildError, ImageFacts, ImageFactsBuilder};
pub use result::{CheckResult, CheckState, TestStatus};
