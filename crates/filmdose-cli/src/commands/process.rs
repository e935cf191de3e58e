use std::path::{Path, PathBuf};
use std::time::Instant;

use filmdose_core::exporters::{
    export_dose_tiff, export_region_tiff, write_json_report, DoseReport,
};
use filmdose_core::models::{Orientation, RegionLabel};
use filmdose_core::{DosePipeline, DoseStatistics};

use super::calibrate::{print_summary, CalibrationSummary};
use super::{configure_threads, ScanInputs};
use crate::parsers::{parse_combine_mode, parse_orientation};

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub inputs: ScanInputs,
    /// Output directory; defaults to the scan's directory.
    pub out: Option<PathBuf>,
    /// Overrides `combine.mode`.
    pub mode: Option<String>,
    /// Overrides `combine.dmax`.
    pub dmax: Option<f64>,
    pub orientation: Option<String>,
    pub save_regions: bool,
    pub json: bool,
    pub threads: Option<usize>,
}

/// Files written by a `process` run.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub dose: PathBuf,
    pub report: PathBuf,
    pub regions: Vec<(RegionLabel, PathBuf)>,
}

/// Output file names derived from the scan's file stem.
pub fn output_paths(scan: &Path, out_dir: Option<&Path>) -> OutputPaths {
    let stem = scan
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "scan".to_string());
    let dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => scan
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    OutputPaths {
        dose: dir.join(format!("{}_dose.tif", stem)),
        report: dir.join(format!("{}_report.json", stem)),
        regions: RegionLabel::ALL
            .iter()
            .map(|&label| {
                let name = format!("{}_{}.tif", stem, label.as_str().to_lowercase());
                (label, dir.join(name))
            })
            .collect(),
    }
}

/// Reconstruct the dose map of one scan and write it with its report.
pub fn cmd_process(options: ProcessOptions) -> Result<(), String> {
    let start_time = Instant::now();
    configure_threads(options.threads)?;

    let mode = options.mode.as_deref().map(parse_combine_mode).transpose()?;
    let orientation = match &options.orientation {
        Some(name) => parse_orientation(name)?,
        None => Orientation::Original,
    };

    let (scan, regions) = options.inputs.load()?;
    let mut config = options.inputs.config()?;
    if let Some(mode) = mode {
        config.combine.mode = mode;
    }
    if let Some(dmax) = options.dmax {
        config.combine.dmax = Some(dmax);
    }

    let mut pipeline = DosePipeline::from_config(config.clone()).map_err(|e| e.to_string())?;
    let run = pipeline
        .run(&scan, &regions)
        .map_err(|e| format!("Reconstruction failed: {}", e))?;
    let dose = run.dose.reoriented(orientation);

    let paths = output_paths(&options.inputs.scan, options.out.as_deref());
    if let Some(dir) = paths.dose.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create output directory: {}", e))?;
    }

    export_dose_tiff(&dose, &paths.dose, Some(run.pixel_pitch_mm)).map_err(|e| e.to_string())?;
    let report = DoseReport::from_run(&run, &config, &dose, orientation);
    write_json_report(&report, &paths.report).map_err(|e| e.to_string())?;

    if options.save_regions {
        let segmented = pipeline
            .segmented()
            .ok_or_else(|| "extracted regions are no longer available".to_string())?;
        for (label, path) in &paths.regions {
            export_region_tiff(segmented.image(*label), path).map_err(|e| e.to_string())?;
        }
    }

    if options.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        println!("{}", json);
        return Ok(());
    }

    print_summary(&CalibrationSummary {
        pixel_pitch_mm: run.pixel_pitch_mm,
        base_densities: run.base,
        calibration: run.calibration.clone(),
        validation: run.validation.clone(),
    });
    print_dose_summary(&report.statistics, dose.width, dose.height);

    let stats = &run.inversion_stats;
    println!(
        "Inversion failures: red {}  green {}  blue {}  (of {} px)",
        stats.failures[0], stats.failures[1], stats.failures[2], stats.pixels
    );
    println!();
    println!("Wrote {}", paths.dose.display());
    println!("Wrote {}", paths.report.display());
    if options.save_regions {
        for (_, path) in &paths.regions {
            println!("Wrote {}", path.display());
        }
    }
    println!("Completed in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn print_dose_summary(stats: &DoseStatistics, width: u32, height: u32) {
    println!("Dose map: {}x{} px", width, height);
    println!(
        "  min {:.3} Gy  max {:.3} Gy  mean {:.3} Gy  median {:.3} Gy  std {:.3} Gy",
        stats.min, stats.max, stats.mean, stats.median, stats.std_dev
    );
    let percentiles: Vec<String> = stats
        .percentiles
        .iter()
        .map(|(p, v)| format!("p{} {:.3}", p, v))
        .collect();
    println!("  {}", percentiles.join("  "));
}
