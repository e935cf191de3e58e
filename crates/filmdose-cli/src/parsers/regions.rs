//! Region arguments: an annotation file or inline `label:x,y,width,height`.

use std::path::Path;

use filmdose_core::models::{Region, RegionLabel};
use filmdose_core::regions::load_regions;

/// Parse an inline region in format "label:x,y,width,height"
///
/// # Examples
/// `film:120,40,800,600`, `background:0,0,50,50`
pub fn parse_region_spec(spec: &str) -> Result<Region, String> {
    let (label, rect) = spec.split_once(':').ok_or_else(|| {
        format!(
            "Region must be in format label:x,y,width,height, got: {}",
            spec
        )
    })?;

    let label = RegionLabel::parse(label).ok_or_else(|| {
        format!(
            "Unknown region label '{}' (expected film, calibration, background or center)",
            label.trim()
        )
    })?;

    let parts: Vec<&str> = rect.split(',').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Region {} must have 4 values x,y,width,height, got: {}",
            label, rect
        ));
    }

    let mut values = [0u32; 4];
    for (value, (part, name)) in values
        .iter_mut()
        .zip(parts.iter().zip(["x", "y", "width", "height"]))
    {
        *value = part
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid {} for region {}: {}", name, label, part))?;
    }

    Ok(Region::new(label, values[0], values[1], values[2], values[3]))
}

/// Resolve `--regions` values into region rectangles.
///
/// A single value naming an existing file is read as a YAML/JSON
/// annotation file; otherwise every value is parsed inline.
pub fn resolve_regions(args: &[String]) -> Result<Vec<Region>, String> {
    if let [single] = args {
        let path = Path::new(single);
        if path.is_file() {
            return load_regions(path).map_err(|e| format!("Failed to load regions: {}", e));
        }
    }
    if args.is_empty() {
        return Err("No regions given".to_string());
    }
    args.iter().map(|arg| parse_region_spec(arg)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_region_spec() {
        let region = parse_region_spec("film:10, 20,300,200").unwrap();
        assert_eq!(region, Region::new(RegionLabel::Film, 10, 20, 300, 200));

        let region = parse_region_spec("Centre:1,2,3,4").unwrap();
        assert_eq!(region.label, RegionLabel::Center);
    }

    #[test]
    fn test_parse_region_spec_errors() {
        assert!(parse_region_spec("film 1,2,3,4").is_err());
        assert!(parse_region_spec("strip:1,2,3,4")
            .unwrap_err()
            .contains("Unknown region label"));
        assert!(parse_region_spec("film:1,2,3").is_err());
        assert!(parse_region_spec("film:1,2,-3,4")
            .unwrap_err()
            .contains("width"));
    }

    #[test]
    fn test_resolve_inline_regions() {
        let args = vec![
            "film:14,40,24,16".to_string(),
            "calibration:0,5,10,150".to_string(),
        ];
        let regions = resolve_regions(&args).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].label, RegionLabel::Calibration);
    }

    #[test]
    fn test_resolve_region_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.yml");
        fs::write(
            &path,
            "regions:\n  - {label: film, left: 1, top: 2, width: 3, height: 4}\n",
        )
        .unwrap();

        let regions = resolve_regions(&[path.display().to_string()]).unwrap();
        assert_eq!(regions, vec![Region::new(RegionLabel::Film, 1, 2, 3, 4)]);
    }

    #[test]
    fn test_resolve_requires_regions() {
        assert!(resolve_regions(&[]).is_err());
    }
}
