mod app;
mod config;
mod error;
mod irc;
mod logging;
mod session;

use crate::app::client::Client;
use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// IRC client driven through named pipes and plain-text logs
#[derive(Parser, Debug)]
#[command(name = "fifoirc")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(short = 's', long, value_name = "HOST")]
    server: Option<String>,

    /// Server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Nickname
    #[arg(short = 'n', long)]
    nick: Option<String>,

    /// Environment variable holding the server password
    #[arg(short = 'k', long, value_name = "VAR")]
    password_env: Option<String>,

    /// Root of the directory tree (default ~/irc)
    #[arg(short = 'i', long, value_name = "DIR")]
    root_dir: Option<String>,

    /// Real name
    #[arg(short = 'f', long)]
    realname: Option<String>,

    /// Connect with TLS
    #[arg(short = 't', long)]
    tls: bool,

    /// Path to configuration file
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command-line flags win over the config file.
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(host) = &self.server {
            cfg.server.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = Some(port);
        }
        if let Some(nick) = &self.nick {
            cfg.server.nickname = nick.clone();
        }
        if let Some(var) = &self.password_env {
            cfg.server.password_env = Some(var.clone());
        }
        if let Some(dir) = &self.root_dir {
            cfg.filesystem.root_dir = dir.clone();
        }
        if let Some(name) = &self.realname {
            cfg.server.realname = Some(name.clone());
        }
        if self.tls {
            cfg.server.tls = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut cfg = config::load_config(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
        on_signal.cancel();
    });

    info!(
        "Connecting to {}:{} as {}",
        cfg.server.host,
        cfg.server.port(),
        cfg.server.nickname
    );
    Client::new(cfg, shutdown).run().await
}
