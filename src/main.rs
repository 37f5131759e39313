use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod cache;
mod config;
mod pan_api;
mod resolver;
mod server;
mod sync;
mod util;

use crate::sync::StrmUrl;
use crate::sync::full::FullSyncEngine;
use crate::sync::incremental::{IncrementalEngine, run_supervised};
use crate::sync::mapper::MappingRules;
use crate::sync::refresh::LibraryRefresh;
use crate::sync::share::{ShareJob, ShareSyncEngine, parse_share_link};
use crate::sync::writer::{MediaExts, StrmWriter};

#[derive(Parser)]
#[command(
    name = "p115strmd",
    version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")"),
    about = "115 cloud-drive STRM mirror and 302 redirect daemon"
)]
struct Cli {
    /// Path to config file [default: ~/.config/p115strmd/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the redirect endpoint and, when enabled, the activity monitor
    Serve,
    /// Mirror all configured path pairs into pointer files once
    FullSync,
    /// Mirror the configured share into pointer files once
    ShareSync,
}

fn init_tracing(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "p115strmd=info",
        1 => "p115strmd=debug",
        2 => "p115strmd=trace",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(cli.config.as_deref())?;

    let client = Arc::new(pan_api::PanClient::new(&cfg.auth));
    let writer = StrmWriter::new(MediaExts::parse(&cfg.full_sync.media_exts));
    let urls = StrmUrl::new(&cfg.server.public_url, &cfg.server.api_token);

    match cli.command {
        Command::Serve => {
            let resolver = Arc::new(resolver::UrlResolver::new(client.clone()));
            let state = server::AppState::new(resolver, &cfg.server.api_token, &cfg.auth.app);
            let cancel = CancellationToken::new();

            // The activity monitor is the only long-lived background task;
            // the supervisor owns its restart-with-cooldown policy.
            let monitor_handle = if cfg.monitor.enabled {
                let rules = MappingRules::parse(&cfg.monitor.paths);
                if rules.is_empty() {
                    tracing::warn!("monitor enabled but monitor.paths has no valid pairs");
                    None
                } else {
                    let engine = IncrementalEngine::new(
                        client.clone(),
                        writer.clone(),
                        urls.clone(),
                        rules,
                        LibraryRefresh::Off,
                        &cfg.monitor,
                    );
                    Some(tokio::spawn(run_supervised(engine, cancel.clone())))
                }
            } else {
                None
            };

            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

            tokio::select! {
                res = server::serve(&cfg.server.bind_addr, state, cancel.clone()) => {
                    cancel.cancel();
                    res?;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, shutting down");
                    cancel.cancel();
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    cancel.cancel();
                }
            }

            if let Some(handle) = monitor_handle {
                let _ = handle.await;
            }
            tracing::info!("p115strmd stopped");
        }

        Command::FullSync => {
            let rules = MappingRules::parse(&cfg.full_sync.paths);
            if rules.is_empty() {
                anyhow::bail!("full_sync.paths has no valid localRoot#remoteRoot pairs");
            }

            let engine = FullSyncEngine::new(
                client.as_ref(),
                &writer,
                &urls,
                cfg.full_sync.remove_orphans,
            );
            let report = engine.run(&rules).await;
            println!("full sync: {report}");
        }

        Command::ShareSync => {
            let job = share_job_from_config(&cfg.share_sync)?;
            let engine = ShareSyncEngine::new(client.as_ref(), &writer, &urls);
            let report = engine.run(&job).await?;
            println!("share sync: {report}");
        }
    }

    Ok(())
}

fn share_job_from_config(cfg: &config::ShareSyncConfig) -> Result<ShareJob> {
    let (share_code, receive_code) = if !cfg.share_link.is_empty() {
        parse_share_link(&cfg.share_link).ok_or_else(|| {
            anyhow::anyhow!("share_sync.share_link is not a recognizable share link")
        })?
    } else {
        (cfg.share_code.clone(), cfg.receive_code.clone())
    };

    if share_code.is_empty() {
        anyhow::bail!("share_sync needs share_link or share_code");
    }
    if receive_code.is_empty() {
        anyhow::bail!("share_sync needs a receive_code");
    }
    if cfg.local_path.is_empty() {
        anyhow::bail!("share_sync.local_path must not be empty");
    }

    Ok(ShareJob {
        share_code,
        receive_code,
        root_id: cfg.root_id,
        share_prefix: cfg.pan_path.clone(),
        local_root: PathBuf::from(&cfg.local_path),
    })
}
