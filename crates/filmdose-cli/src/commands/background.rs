use filmdose_core::background::estimate_background;
use filmdose_core::models::Channel;
use filmdose_core::regions::extract_regions;
use serde::Serialize;

use super::ScanInputs;

#[derive(Debug, Clone, Default)]
pub struct BackgroundOptions {
    pub inputs: ScanInputs,
    /// Overrides `background.margin`.
    pub margin: Option<u32>,
    pub json: bool,
}

/// Background estimate for JSON output.
#[derive(Serialize)]
struct BackgroundResult {
    margin: u32,
    mean_intensity: [f64; 3],
    base_densities: [f64; 3],
    full_scale: u16,
}

/// Report the per-channel base optical density of the background region.
pub fn cmd_background(options: BackgroundOptions) -> Result<(), String> {
    let (scan, regions) = options.inputs.load()?;
    let config = options.inputs.config()?;
    let margin = options.margin.unwrap_or(config.background.margin);

    let segmented = extract_regions(&scan, &regions).map_err(|e| e.to_string())?;
    let base = estimate_background(&segmented.background, margin).map_err(|e| e.to_string())?;

    // Mean intensity that the density was computed from.
    let full_scale = scan.full_scale as f64;
    let mean_intensity = base.map(|d| full_scale / 10f64.powf(d));

    if options.json {
        let result = BackgroundResult {
            margin,
            mean_intensity,
            base_densities: base,
            full_scale: scan.full_scale,
        };
        let json = serde_json::to_string_pretty(&result)
            .map_err(|e| format!("Failed to serialize result: {}", e))?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "Background region: {}x{} px, margin {}",
        segmented.background.width, segmented.background.height, margin
    );
    for channel in Channel::ALL {
        let c = channel.index();
        println!(
            "  {:<5}  mean intensity {:>10.2} / {}   base density {:.5}",
            channel.name(),
            mean_intensity[c],
            scan.full_scale,
            base[c]
        );
    }
    Ok(())
}
