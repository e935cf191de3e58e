//! Shared utilities for filmdose-cli
//!
//! Argument parsers and command implementations, kept in a library so they
//! can be tested without spawning the binary.

pub mod commands;
pub mod parsers;

// Re-export commonly used items at the crate root for convenience
pub use commands::{
    cmd_background, cmd_calibrate, cmd_init, cmd_process, BackgroundOptions, CalibrateOptions,
    ProcessOptions, ScanInputs,
};
pub use parsers::{parse_combine_mode, parse_orientation, parse_region_spec, resolve_regions};
