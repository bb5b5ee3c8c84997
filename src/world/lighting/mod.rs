//! Skylight propagation and the background lighting corrector.

pub mod corrector;
pub mod skylight;
pub mod worker;

pub use corrector::{LightingCorrector, LightingCorrectorConfig};
pub use worker::{
    run_lighting_job, ColumnLightEntry, LightingJob, LightingJobKind, LightingResult,
    UpdatedSubLight,
};
