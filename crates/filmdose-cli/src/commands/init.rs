use std::path::PathBuf;

use filmdose_core::DoseConfig;

const HEADER: &str = "\
# filmdose configuration
#
# Every section may be omitted to keep its defaults. combine.dmax and
# calibration.reference_table must be set before `filmdose process` runs.
";

/// Write the default configuration as YAML.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn cmd_init(out: Option<PathBuf>, force: bool) -> Result<(), String> {
    let path = out.unwrap_or_else(|| PathBuf::from("filmdose.yml"));
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }

    let yaml = DoseConfig::default()
        .to_yaml()
        .map_err(|e| format!("Failed to serialize default config: {}", e))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    std::fs::write(&path, format!("{}\n{}", HEADER, yaml))
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
