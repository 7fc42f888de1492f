//! Launcher settings for a project.
//!
//! Settings live in `<projectRoot>/.buck-launcher.yaml`. The file is optional,
//! every key has a default, and unknown keys are ignored. A handful of
//! environment variables override the file after it is loaded.

mod model;
mod operations;


pub use model::{CONFIG_FILE_NAME, LauncherConfig};
