pub mod config;
pub mod pipeline;
pub mod report;

pub use config::load_engine_config;
pub use pipeline::{GradeJob, GradingPipeline};
pub use report::GradeReport;
