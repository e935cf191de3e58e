//! Run configuration management.
//!
//! This module provides configuration loading, the global verbose flag and
//! the section types that parameterize every stage of a reconstruction.

mod defaults;

pub use defaults::{
    BackgroundConfig, CalibrationConfig, CombineConfig, DenoiseConfig, InversionConfig,
    LateralConfig, ScannerConfig,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Once, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{DoseError, DoseResult};
use crate::models::ModelPriors;

// Global verbose flag for controlling diagnostic output
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set the global verbose flag. When true, stage diagnostics are printed.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::SeqCst);
}

/// Check if verbose mode is enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

/// Print a message to stderr only if verbose mode is enabled.
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if $crate::config::is_verbose() {
            eprintln!($($arg)*);
        }
    };
}

/// Candidate config file names searched for on disk.
const CONFIG_FILENAMES: &[&str] = &["filmdose.yml", "filmdose.yaml"];

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FILMDOSE_CONFIG";

/// Loaded configuration together with its source path and load warnings.
pub struct DoseConfigHandle {
    pub config: DoseConfig,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl DoseConfigHandle {
    fn with_config(config: DoseConfig, source: Option<PathBuf>, warnings: Vec<String>) -> Self {
        Self {
            config,
            source,
            warnings,
        }
    }
}

/// Complete configuration file structure.
///
/// Every section falls back to its defaults when omitted, so a file only
/// needs the keys it changes. `combine.dmax` has no default and must be set
/// before a run validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoseConfig {
    pub background: BackgroundConfig,
    pub denoise: DenoiseConfig,
    pub calibration: CalibrationConfig,
    pub model: ModelPriors,
    pub lateral: LateralConfig,
    pub inversion: InversionConfig,
    pub combine: CombineConfig,
    pub scanner: ScannerConfig,
}

impl DoseConfig {
    /// Parse a YAML config file.
    pub fn from_file(path: &Path) -> DoseResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents).map_err(|err| match err {
            DoseError::Configuration(msg) => {
                DoseError::config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn from_yaml(contents: &str) -> DoseResult<Self> {
        serde_yaml::from_str(contents).map_err(|e| DoseError::config(e.to_string()))
    }

    pub fn to_yaml(&self) -> DoseResult<String> {
        serde_yaml::to_string(self).map_err(|e| DoseError::config(e.to_string()))
    }

    /// Check every section. Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> DoseResult<()> {
        self.denoise.validate()?;
        self.calibration.validate()?;
        for channel in crate::models::Channel::ALL {
            let priors = self.model.channel(channel);
            let values = [priors.k_r, priors.k_b, priors.phi_r, priors.phi_b];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(DoseError::config(format!(
                    "model.{} constants must be finite and non-negative",
                    channel
                )));
            }
            if priors.k_r <= 0.0 || priors.k_b <= 0.0 {
                return Err(DoseError::config(format!(
                    "model.{} rate constants must be positive",
                    channel
                )));
            }
        }
        if self.lateral.enabled && self.lateral.curve_file.is_none() {
            return Err(DoseError::config(
                "lateral correction is enabled but lateral.curve_file is not set",
            ));
        }
        self.inversion.validate()?;
        self.combine.validate()?;
        self.scanner.validate()
    }

    /// 64-bit FNV-1a digest of the effective parameters serialized as JSON,
    /// recorded in run reports. Identical across builds and platforms for
    /// the same configuration schema.
    pub fn fingerprint(&self) -> u64 {
        fnv1a64(serde_json::to_string(self).unwrap_or_default().as_bytes())
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(PRIME)
    })
}

/// Load configuration from disk, optionally forcing a specific path.
///
/// Unreadable or unparsable candidates are skipped with a warning; built-in
/// defaults are used when nothing loads.
pub fn load_dose_config(custom_path: Option<&Path>) -> DoseConfigHandle {
    let mut warnings = Vec::new();

    for candidate in get_config_candidates(custom_path) {
        if !candidate.is_file() {
            continue;
        }

        match DoseConfig::from_file(&candidate) {
            Ok(config) => {
                let source = fs::canonicalize(&candidate).unwrap_or(candidate);
                return DoseConfigHandle::with_config(config, Some(source), warnings);
            }
            Err(err) => warnings.push(format!(
                "Failed to load config {}: {}",
                candidate.display(),
                err
            )),
        }
    }

    warnings.push("No config file found; using built-in defaults.".to_string());
    DoseConfigHandle::with_config(DoseConfig::default(), None, warnings)
}

/// Config file candidates in priority order.
fn get_config_candidates(custom_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = custom_path {
        candidates.push(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        candidates.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        for name in CONFIG_FILENAMES {
            candidates.push(cwd.join("config").join(name));
            candidates.push(cwd.join(name));
        }
    }

    if let Some(home_dir) = dirs::home_dir() {
        for name in CONFIG_FILENAMES {
            candidates.push(home_dir.join("filmdose").join(name));
        }
    }

    candidates
}

static DOSE_CONFIG_HANDLE: OnceLock<DoseConfigHandle> = OnceLock::new();
static PRINT_CONFIG_ONCE: Once = Once::new();

/// Access the process-wide configuration (loaded once per process).
pub fn dose_config_handle() -> &'static DoseConfigHandle {
    DOSE_CONFIG_HANDLE.get_or_init(|| load_dose_config(None))
}

/// Print config source and warnings for `handle` once (verbose mode only).
pub fn log_config_usage(handle: &DoseConfigHandle) {
    PRINT_CONFIG_ONCE.call_once(|| {
        if !is_verbose() {
            return;
        }
        if let Some(source) = &handle.source {
            eprintln!("[filmdose] Loaded config from {}", source.display());
        } else {
            eprintln!("[filmdose] Using built-in defaults");
        }

        for warning in &handle.warnings {
            eprintln!("[filmdose] Config warning: {}", warning);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> DoseConfig {
        let mut config = DoseConfig::default();
        config.combine.dmax = Some(10.0);
        config.lateral.enabled = false;
        config
    }

    #[test]
    fn test_default_requires_dmax() {
        let mut config = valid_config();
        config.combine.dmax = None;
        match config.validate() {
            Err(DoseError::Configuration(msg)) => assert!(msg.contains("dmax")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "combine:\n  dmax: 8.0\ndenoise:\n  enabled: false\n";
        let config = DoseConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.combine.dmax, Some(8.0));
        assert!(!config.denoise.enabled);
        assert_eq!(config.background, BackgroundConfig::default());
        assert_eq!(config.model, ModelPriors::default());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = valid_config();
        config.combine.weights = [1.0, -0.5, 0.0];
        assert!(matches!(
            config.validate(),
            Err(DoseError::Configuration(_))
        ));
    }

    #[test]
    fn test_inverted_depth_window_rejected() {
        let mut config = valid_config();
        config.calibration.depth_min_cm = 5.0;
        config.calibration.depth_max_cm = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lateral_enabled_without_curves_rejected() {
        let mut config = valid_config();
        config.lateral.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_preserves_fingerprint() {
        let config = valid_config();
        let yaml = config.to_yaml().unwrap();
        let reloaded = DoseConfig::from_yaml(&yaml).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.fingerprint(), config.fingerprint());
    }

    #[test]
    fn test_fnv1a64_known_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_fingerprint_changes_with_parameters() {
        let a = valid_config();
        let mut b = valid_config();
        b.background.margin += 1;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filmdose.yml");
        fs::write(&path, "combine:\n  dmax: 12.5\n").unwrap();
        let handle = load_dose_config(Some(&path));
        assert!(handle.source.is_some());
        assert_eq!(handle.config.combine.dmax, Some(12.5));
    }

    #[test]
    fn test_bad_file_produces_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        fs::write(&path, "combine: [not, a, map\n").unwrap();
        let handle = load_dose_config(Some(&path));
        assert!(handle
            .warnings
            .iter()
            .any(|w| w.contains("broken.yml")));
    }
}
