// src/main.rs

use addonpm::{PackageType, ResolveRequest, Resolver, ResolverConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "addonpm")]
#[command(author, version, about = "Add-on package resolver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArg {
    /// Resolver configuration file
    #[arg(short, long, default_value = "addonpm.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute an install/upgrade/remove plan
    Resolve {
        #[command(flatten)]
        config: ConfigArg,
        /// Package to install (id, name, or name:range)
        #[arg(long)]
        install: Vec<String>,
        /// Package to remove
        #[arg(long)]
        remove: Vec<String>,
        /// Package to upgrade
        #[arg(long)]
        upgrade: Vec<String>,
        /// Override the configured target platform
        #[arg(long)]
        target_platform: Option<String>,
        /// Admit every SNAPSHOT version
        #[arg(long)]
        allow_snapshot: bool,
        /// Do not try to keep installed packages
        #[arg(long)]
        no_keep: bool,
        /// Solver deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List remote packages that update installed ones
    Updates {
        #[command(flatten)]
        config: ConfigArg,
    },
    /// List the highest version of every known package
    List {
        #[command(flatten)]
        config: ConfigArg,
        /// Only list packages of this type
        #[arg(long = "type")]
        package_type: Option<PackageType>,
    },
    /// Print the CUDF universe for an install request
    Cudf {
        #[command(flatten)]
        config: ConfigArg,
        /// Package to install (id, name, or name:range)
        #[arg(long)]
        install: Vec<String>,
    },
}

fn load_config(arg: &ConfigArg) -> Result<ResolverConfig> {
    ResolverConfig::load(&arg.config)
        .with_context(|| format!("Failed to load {}", arg.config.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            config,
            install,
            remove,
            upgrade,
            target_platform,
            allow_snapshot,
            no_keep,
            timeout,
        } => {
            let config = load_config(&config)?;
            let mut options = config.options();
            if let Some(platform) = target_platform {
                options = options.with_target_platform(platform);
            }
            if allow_snapshot {
                options = options.with_allow_snapshot(true);
            }
            if no_keep {
                options = options.with_keep_installed(false);
            }
            if let Some(secs) = timeout {
                options = options.with_timeout(Duration::from_secs(secs));
            }

            let snapshot = config.build_catalog()?.snapshot()?;
            let request = ResolveRequest::from_tokens(&install, &remove, &upgrade, &snapshot)?;
            info!(
                "Resolving {} install, {} remove, {} upgrade requests",
                request.install.len(),
                request.remove.len(),
                request.upgrade.len()
            );

            let plan = Resolver::new(snapshot, options).resolve(&request)?;
            print!("{}", plan);
            Ok(())
        }
        Commands::Updates { config } => {
            let catalog = load_config(&config)?.build_catalog()?;
            let updates = catalog.list_update_candidates()?;
            if updates.is_empty() {
                println!("No updates available");
            }
            for pkg in updates {
                println!("{}\t{}", pkg.id(), pkg.package_type);
            }
            Ok(())
        }
        Commands::List {
            config,
            package_type,
        } => {
            let catalog = load_config(&config)?.build_catalog()?;
            for pkg in catalog.list_packages_of_type(package_type)? {
                println!("{}\t{}\t{}", pkg.id(), pkg.package_type, pkg.state);
            }
            Ok(())
        }
        Commands::Cudf { config, install } => {
            let config = load_config(&config)?;
            let snapshot = config.build_catalog()?.snapshot()?;
            let request = ResolveRequest::from_tokens(&install, &[], &[], &snapshot)?;
            let resolver = Resolver::new(snapshot, config.options());
            print!("{}", resolver.cudf(&request)?);
            Ok(())
        }
    }
}
