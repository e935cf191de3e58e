use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use filmdose_cli::{
    cmd_background, cmd_calibrate, cmd_init, cmd_process, BackgroundOptions, CalibrateOptions,
    ProcessOptions, ScanInputs,
};

#[derive(Parser)]
#[command(name = "filmdose")]
#[command(
    version,
    about = "Absorbed-dose reconstruction from radiochromic film scans",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Arguments shared by every command that reads a scan.
#[derive(Args)]
struct ScanArgs {
    /// Scanned film image (TIFF or PNG)
    #[arg(value_name = "SCAN")]
    scan: PathBuf,

    /// Region annotation file, or inline regions as label:x,y,width,height
    #[arg(short, long, value_name = "FILE|REGION", num_args = 1.., required = true)]
    regions: Vec<String>,

    /// Configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print stage diagnostics to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl From<ScanArgs> for ScanInputs {
    fn from(args: ScanArgs) -> Self {
        ScanInputs {
            scan: args.scan,
            regions: args.regions,
            config: args.config,
            verbose: args.verbose,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct the dose map of a film scan
    Process {
        #[command(flatten)]
        scan: ScanArgs,

        /// Output directory (defaults to the scan's directory)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Channel combination: weighted, red, green or blue
        #[arg(short, long, value_name = "MODE")]
        mode: Option<String>,

        /// Maximum plausible dose in Gy (overrides combine.dmax)
        #[arg(long, value_name = "GY")]
        dmax: Option<f64>,

        /// Output orientation, e.g. rot90 or mirror-rot180
        #[arg(long, value_name = "NAME")]
        orientation: Option<String>,

        /// Also write every extracted region as a 16-bit TIFF
        #[arg(long)]
        save_regions: bool,

        /// Print the run report as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Number of parallel threads
        #[arg(short = 'j', long, value_name = "N")]
        threads: Option<usize>,
    },

    /// Fit and validate the calibration without reconstructing the film
    Calibrate {
        #[command(flatten)]
        scan: ScanArgs,

        /// Print the calibration as JSON
        #[arg(long)]
        json: bool,
    },

    /// Estimate the base optical density of the background region
    Background {
        #[command(flatten)]
        scan: ScanArgs,

        /// Pixels trimmed from each edge (overrides background.margin)
        #[arg(long, value_name = "N")]
        margin: Option<u32>,

        /// Print the estimate as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration file
    Init {
        /// Destination (default: ./filmdose.yml)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Process {
            scan,
            out,
            mode,
            dmax,
            orientation,
            save_regions,
            json,
            threads,
        } => cmd_process(ProcessOptions {
            inputs: scan.into(),
            out,
            mode,
            dmax,
            orientation,
            save_regions,
            json,
            threads,
        }),

        Commands::Calibrate { scan, json } => cmd_calibrate(CalibrateOptions {
            inputs: scan.into(),
            json,
        }),

        Commands::Background { scan, margin, json } => cmd_background(BackgroundOptions {
            inputs: scan.into(),
            margin,
            json,
        }),

        Commands::Init { out, force } => cmd_init(out, force),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
