//! Robot task dataset builder
//!
//! Facade over the workspace crates. Turns a directory of robot-task videos
//! into a captioned (frame, audio slice) dataset. See `task-dataset-cli` for
//! the command-line entry point.

pub use task_dataset_common as common;
pub use task_dataset_core as dataset;
pub use task_dataset_decomposer as decomposer;
