pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod provision;
pub mod report;
pub mod resolve;
pub mod stages;
pub mod toolcache;
pub mod validation;

pub use config::{ConfigurationContext, ToolSpec};
pub use error::PipelineError;
pub use pipeline::{PipelineExecutor, PipelineResult, PipelineState};
pub use process::{ProcessRunner, SystemRunner};
pub use provision::Provisioner;
