//! Engine configuration.

mod settings;

pub use settings::{
    AmendmentConfig, ConfidenceConfig, ConvoyConfig, EditConfig, OrchestratorConfig, ReviewConfig,
};
