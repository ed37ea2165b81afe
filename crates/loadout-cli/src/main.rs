use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

mod dispatch;
mod render;


#[derive(Parser, Debug)]
#[command(name = "loadout")]
#[command(about = "Workload manifest and install-state engine", long_about = None)]
pub struct Cli {
    /// SDK root directory; defaults to $LOADOUT_ROOT, then the per-user
    /// install location.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Version of the running SDK; defaults to $LOADOUT_SDK_VERSION.
    #[arg(long, global = true)]
    sdk_version: Option<String>,
    /// Directory to search for a global.json; defaults to the current
    /// directory.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the resolved workload version for the current directory
    Version {
        /// Resolve against this feature band instead of the SDK's own
        #[arg(long)]
        sdk_band: Option<String>,
    },
    /// List every manifest in the current resolution
    Resolve,
    /// Verify the active workload set and reinstall missing manifests
    Repair {
        /// Directory holding extracted manifest packages
        #[arg(long)]
        source: Option<PathBuf>,
        /// Report what would be repaired without changing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the reconstructed workload history
    History,
    /// List live global.json pins for the current band
    Pins,
    /// Change per-band workload configuration
    Config {
        #[arg(long, value_enum)]
        update_mode: UpdateMode,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateMode {
    WorkloadSets,
    Manifests,
}

fn main() -> Result<()> {
    dispatch::run(Cli::parse())
}
