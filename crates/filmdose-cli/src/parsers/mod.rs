//! Parsing functions for CLI arguments.

mod options;
mod regions;

pub use options::{parse_combine_mode, parse_orientation};
pub use regions::{parse_region_spec, resolve_regions};
