//! Video and audio conversion pipeline: argument construction, bitrate
//! budgeting, source probing, and job sequencing against the engine.

pub mod budget;
pub mod builder;
pub mod job;
pub mod probe;

pub use budget::{BitrateBudget, allocate_bitrate};
pub use builder::display_command;
pub use job::{JobOutput, JobRunner, JobState, StreamCopyJob};
pub use probe::{FileMetadata, ProbeCache, probe_file};
