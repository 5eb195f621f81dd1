mod build;
mod mirror;

pub use build::{DEFAULT_SNAPSHOT_CAP, build_snapshot};
pub use mirror::{ApplyReport, Mirror};
