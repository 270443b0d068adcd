pub mod commands;

pub use commands::{apply_overrides, build_cli};
