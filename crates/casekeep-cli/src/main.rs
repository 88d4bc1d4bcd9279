mod cmd_archive;

use clap::{Parser, Subcommand};
use cmd_archive::{CaseParams, Phase};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "casekeep",
    version,
    about = "Archive and prune CFD case folders by retention policy"
)]
struct Cli {
    /// Options file (default: nearest casekeep.yaml above the case folder)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Case folder (default: current directory)
    #[arg(long, global = true)]
    case_dir: Option<PathBuf>,
    /// Case name under the archive root, as GROUP/CASE
    #[arg(long, global = true)]
    case_name: Option<String>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy, bundle, and prune progress files while the job may be running
    Clean {
        /// Log every action without copying or deleting anything
        #[arg(long, alias = "dry-run")]
        test: bool,
    },
    /// Archive a finished case
    Archive {
        /// Log every action without copying or deleting anything
        #[arg(long, alias = "dry-run")]
        test: bool,
    },
    /// Delete everything except the files needed to inspect the case
    Skeleton {
        /// Log every action without copying or deleting anything
        #[arg(long, alias = "dry-run")]
        test: bool,
    },
    /// Unpack a bundle into the case folder
    Restore {
        /// Bundle name; the archive extension is added if missing
        tarball: String,
        /// Read the bundle from the case archive instead of the case folder
        #[arg(long)]
        from_archive: bool,
        /// Log the action without unpacking
        #[arg(long, alias = "dry-run")]
        test: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let case_dir = match cli.case_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let params = CaseParams {
        case_dir: &case_dir,
        config: cli.config.as_deref(),
        case_name: cli.case_name.as_deref(),
    };

    match cli.cmd {
        Command::Clean { test } => cmd_archive::execute(&params, Phase::Progress, test),
        Command::Archive { test } => cmd_archive::execute(&params, Phase::Archive, test),
        Command::Skeleton { test } => cmd_archive::execute(&params, Phase::Skeleton, test),
        Command::Restore {
            tarball,
            from_archive,
            test,
        } => cmd_archive::restore(&params, &tarball, from_archive, test),
    }
}
