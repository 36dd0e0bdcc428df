mod settings;

pub use settings::{CliConfig, DEFAULT_BASE_REGISTRY, EngineConfig};
