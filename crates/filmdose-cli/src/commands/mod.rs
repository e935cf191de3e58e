//! Command implementations for the filmdose CLI.

mod background;
mod calibrate;
mod init;
mod process;

pub use background::{cmd_background, BackgroundOptions};
pub use calibrate::{cmd_calibrate, CalibrateOptions, CalibrationSummary};
pub use init::cmd_init;
pub use process::{cmd_process, output_paths, OutputPaths, ProcessOptions};

use std::path::Path;

use filmdose_core::config::{dose_config_handle, log_config_usage, set_verbose};
use filmdose_core::decoders::decode_scan;
use filmdose_core::models::{Region, ScannedImage};
use filmdose_core::DoseConfig;

use crate::parsers::resolve_regions;

/// Options shared by every command that reads a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanInputs {
    pub scan: std::path::PathBuf,
    pub regions: Vec<String>,
    pub config: Option<std::path::PathBuf>,
    pub verbose: bool,
}

impl ScanInputs {
    /// Decode the scan and resolve its region annotations.
    pub fn load(&self) -> Result<(ScannedImage, Vec<Region>), String> {
        set_verbose(self.verbose);
        let scan = decode_scan(&self.scan)
            .map_err(|e| format!("Failed to decode {}: {}", self.scan.display(), e))?;
        let regions = resolve_regions(&self.regions)?;
        Ok((scan, regions))
    }

    /// Explicit `--config` must load; otherwise the searched config is used.
    pub fn config(&self) -> Result<DoseConfig, String> {
        load_config(self.config.as_deref())
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<DoseConfig, String> {
    match path {
        Some(path) => DoseConfig::from_file(path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => {
            let handle = dose_config_handle();
            log_config_usage(handle);
            Ok(handle.config.clone())
        }
    }
}

/// Configure the global rayon pool.
pub(crate) fn configure_threads(threads: Option<usize>) -> Result<(), String> {
    if let Some(num_threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(|e| format!("Failed to configure thread pool: {}", e))?;
    }
    Ok(())
}
