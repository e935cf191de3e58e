//! Parsers for reconstruction options.

use filmdose_core::combine::CombineMode;
use filmdose_core::models::Orientation;

/// Parse a channel combination mode: "weighted", "red", "green" or "blue"
pub fn parse_combine_mode(mode_str: &str) -> Result<CombineMode, String> {
    CombineMode::parse(mode_str.trim()).ok_or_else(|| {
        format!(
            "Unknown combine mode '{}'. Valid options: weighted, red, green, blue",
            mode_str
        )
    })
}

/// Parse an output orientation such as "rot90" or "mirror-rot180"
pub fn parse_orientation(orientation_str: &str) -> Result<Orientation, String> {
    Orientation::parse(orientation_str).ok_or_else(|| {
        let valid: Vec<&str> = Orientation::ALL.iter().map(|o| o.as_str()).collect();
        format!(
            "Unknown orientation '{}'. Valid options: {}",
            orientation_str,
            valid.join(", ")
        )
    })
}
