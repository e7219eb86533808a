pub mod config_reloader;
pub mod pipeline_actor;

pub use config_reloader::ConfigReloader;
pub use pipeline_actor::{PipelineActor, PipelineMessage, PipelineStats};
