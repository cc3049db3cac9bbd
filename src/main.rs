//! Jelly command-line entry point
//!
//! Thin mapping from subcommands onto engine operations; rendering beyond
//! plain text lives in the CLI collaborator.

use clap::{Parser, Subcommand};
use jelly::engine::{find_project_root, Engine};
use jelly::PackageId;

#[derive(Parser)]
#[command(name = "jelly")]
#[command(about = "Package manager for the Roblox ecosystem", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Jelly project
    Init {
        /// Project name (defaults to the directory name)
        name: Option<String>,
    },
    /// Install all dependencies
    Install,
    /// Add dependencies (scope/name[@range])
    Add {
        /// Packages to add
        packages: Vec<String>,

        /// Add as dev dependencies
        #[arg(long)]
        dev: bool,
    },
    /// Remove dependencies
    Remove {
        /// Packages to remove (scope/name)
        packages: Vec<String>,
    },
    /// Update dependencies to the latest registry version
    Update {
        /// Packages to update (all direct dependencies when omitted)
        packages: Vec<String>,
    },
    /// List dependencies with a newer registry version
    Outdated,
    /// Resolve the dependency tree without installing
    Analyze,
    /// Check that the lockfile covers the manifest
    VerifyLock,
    /// Resolve from scratch and rewrite the lockfile
    RegenerateLock,
    /// Remove orphaned packages and shims
    Clean,
    /// Wipe the per-user artifact cache
    CacheClean,
}

fn parse_ids(packages: &[String]) -> anyhow::Result<Vec<PackageId>> {
    packages
        .iter()
        .map(|p| p.parse::<PackageId>().map_err(Into::into))
        .collect()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let project_root = match cli.command {
        Commands::Init { .. } => cwd.clone(),
        _ => find_project_root(&cwd).unwrap_or(cwd),
    };

    let engine = Engine::new(project_root)?;

    match cli.command {
        Commands::Init { name } => {
            engine.init(name.as_deref())?;
        }
        Commands::Install => {
            engine.install_all()?;
        }
        Commands::Add { packages, dev } => {
            engine.add(&packages, dev)?;
        }
        Commands::Remove { packages } => {
            engine.remove(&parse_ids(&packages)?)?;
        }
        Commands::Update { packages } => {
            if packages.is_empty() {
                engine.update(None)?;
            } else {
                engine.update(Some(&parse_ids(&packages)?))?;
            }
        }
        Commands::Outdated => {
            let outdated = engine.outdated()?;
            if outdated.is_empty() {
                println!("Everything is up to date");
            }
            for entry in outdated {
                println!("  {}: {} -> {}", entry.id, entry.current, entry.latest);
            }
        }
        Commands::Analyze => {
            engine.analyze()?;
        }
        Commands::VerifyLock => {
            if engine.verify_lock()? {
                println!("Lockfile covers the manifest");
            } else {
                println!("Lockfile is stale or missing");
                std::process::exit(1);
            }
        }
        Commands::RegenerateLock => {
            engine.regenerate_lock()?;
        }
        Commands::Clean => {
            engine.clean()?;
        }
        Commands::CacheClean => {
            engine.cache_clean()?;
        }
    }

    Ok(())
}
