//! elm-mirror CLI: mirror, verify, serve and bundle the Elm package registry.

mod commands;
mod config;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use elm_mirror_sync::SyncOutcome;
use tracing_subscriber::EnvFilter;

use config::MirrorConfig;

/// Exit status when a sync or backfill left failures or was cancelled.
const EXIT_INCOMPLETE: i32 = 2;

#[derive(Parser)]
#[command(name = "elm-mirror", version, about = "Mirror of the Elm package registry")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Configuration file (default: <mirror>/elm-mirror.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch new releases from upstream into the mirror
    Sync {
        /// Mirror directory
        #[arg(long = "mirror-content", default_value = "mirror")]
        mirror: PathBuf,
        /// JSON array of "author/name@version" or "author/name" (default: everything upstream)
        #[arg(long)]
        package_list: Option<PathBuf>,
        /// Upstream package server URL
        #[arg(long)]
        upstream: Option<String>,
        /// Upstream requests per hour, 0 for unlimited
        #[arg(long)]
        rate_limit: Option<u32>,
        /// Releases fetched concurrently
        #[arg(long)]
        concurrency: Option<usize>,
        /// Retries for a transient upstream failure
        #[arg(long)]
        retries: Option<u32>,
        /// Stop cleanly after this many seconds
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Check every mirrored archive against its recorded digest
    Verify {
        /// Mirror directory
        #[arg(long = "mirror-content", default_value = "mirror")]
        mirror: PathBuf,
    },
    /// Serve the mirror to Elm clients
    Serve {
        /// Mirror directory
        #[arg(long = "mirror-content", default_value = "mirror")]
        mirror: PathBuf,
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to bind
        #[arg(long)]
        port: Option<u16>,
        /// External URL of the mirror, used in endpoint.json
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Rebuild the all-packages index from the sync log and upstream
    Reindex {
        /// Mirror directory
        #[arg(long = "mirror-content", default_value = "mirror")]
        mirror: PathBuf,
        /// Upstream package server URL
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Fetch docs.json for mirrored releases that lack it
    BackfillDocs {
        /// Mirror directory
        #[arg(long = "mirror-content", default_value = "mirror")]
        mirror: PathBuf,
        /// Upstream package server URL
        #[arg(long)]
        upstream: Option<String>,
        /// Upstream requests per hour, 0 for unlimited
        #[arg(long)]
        rate_limit: Option<u32>,
    },
    /// Split the mirror into size-bounded .tar.gz bundles
    Bundle {
        /// Mirror directory
        #[arg(long = "mirror-content", default_value = "mirror")]
        mirror: PathBuf,
        /// Output directory
        #[arg(long, default_value = ".")]
        output: PathBuf,
        /// Name component of the archives (default: today's date, YYYYMMDD)
        #[arg(long)]
        label: Option<String>,
        /// Maximum uncompressed bytes per bundle
        #[arg(long)]
        max_bytes: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

/// Exit status for a finished sync.
fn sync_exit_code(outcome: SyncOutcome) -> i32 {
    match outcome {
        SyncOutcome::Clean => 0,
        SyncOutcome::PartialFailure | SyncOutcome::Cancelled => EXIT_INCOMPLETE,
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let explicit = cli.config.as_deref();

    match cli.command {
        Commands::Sync {
            mirror,
            package_list,
            upstream,
            rate_limit,
            concurrency,
            retries,
            deadline,
        } => {
            let mut config = MirrorConfig::load(explicit, &mirror)?;
            if let Some(url) = upstream {
                config.upstream.url = url;
            }
            if let Some(rate) = rate_limit {
                config.upstream.rate_limit = rate;
            }
            if let Some(concurrency) = concurrency {
                config.sync.concurrency = concurrency;
            }
            if let Some(retries) = retries {
                config.sync.retries = retries;
            }
            let outcome = runtime()?.block_on(commands::sync::run(
                &mirror,
                &config,
                package_list.as_deref(),
                deadline.map(Duration::from_secs),
            ))?;
            Ok(sync_exit_code(outcome))
        }

        Commands::Verify { mirror } => {
            let passed = runtime()?.block_on(commands::verify::run(&mirror))?;
            Ok(if passed { 0 } else { 1 })
        }

        Commands::Serve {
            mirror,
            host,
            port,
            base_url,
        } => {
            let mut config = MirrorConfig::load(explicit, &mirror)?;
            if let Some(host) = host {
                config.serve.host = host;
            }
            if let Some(port) = port {
                config.serve.port = port;
            }
            if base_url.is_some() {
                config.serve.base_url = base_url;
            }
            runtime()?.block_on(commands::serve::run(&mirror, &config))?;
            Ok(0)
        }

        Commands::Reindex { mirror, upstream } => {
            let mut config = MirrorConfig::load(explicit, &mirror)?;
            if let Some(url) = upstream {
                config.upstream.url = url;
            }
            runtime()?.block_on(commands::reindex::run(&mirror, &config))?;
            Ok(0)
        }

        Commands::BackfillDocs {
            mirror,
            upstream,
            rate_limit,
        } => {
            let mut config = MirrorConfig::load(explicit, &mirror)?;
            if let Some(url) = upstream {
                config.upstream.url = url;
            }
            if let Some(rate) = rate_limit {
                config.upstream.rate_limit = rate;
            }
            let complete = runtime()?.block_on(commands::backfill::run(&mirror, &config))?;
            Ok(if complete { 0 } else { EXIT_INCOMPLETE })
        }

        Commands::Bundle {
            mirror,
            output,
            label,
            max_bytes,
        } => {
            let config = MirrorConfig::load(explicit, &mirror)?;
            let max_bytes = max_bytes.unwrap_or(config.bundle.max_bytes);
            commands::bundle::run(&mirror, &output, label.as_deref(), max_bytes)?;
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "elm-mirror",
            "sync",
            "--mirror-content",
            "/srv/mirror",
            "--package-list",
            "packages.json",
            "--rate-limit",
            "0",
            "--deadline",
            "60",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync {
                mirror,
                package_list,
                rate_limit,
                deadline,
                ..
            } => {
                assert_eq!(mirror, PathBuf::from("/srv/mirror"));
                assert_eq!(package_list, Some(PathBuf::from("packages.json")));
                assert_eq!(rate_limit, Some(0));
                assert_eq!(deadline, Some(60));
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn incomplete_syncs_exit_nonzero() {
        assert_eq!(sync_exit_code(SyncOutcome::Clean), 0);
        assert_eq!(sync_exit_code(SyncOutcome::PartialFailure), EXIT_INCOMPLETE);
        assert_eq!(sync_exit_code(SyncOutcome::Cancelled), EXIT_INCOMPLETE);
    }
}
