pub mod indicators;
pub mod pipeline;
pub mod sanitize;
pub mod window;

pub use pipeline::{acquire, process_directory, Pipeline, RunReport};
pub use sanitize::EmptyColumnPolicy;
pub use window::MomentEstimator;
