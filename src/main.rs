use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use web_ca::authority::{self, CertificateAuthority};
use web_ca::configs::{AppConfig, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(version, about = "Issue certificates from a local OpenSSL CA through a web form")]
struct Opts {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Serve the web interface
    Serve,
    /// Prepare the CA work directory
    Setup {
        /// Also generate a self-signed CA certificate if none exists
        #[arg(long)]
        bootstrap_ca: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("web_ca=info,tower_http=info")),
        )
        .init();

    let opts = Opts::parse();
    let config = AppConfig::load_or_default(&opts.config)?;

    match opts.cmd {
        Cmd::Serve => web_ca::webserver::serve(config).await,
        Cmd::Setup { bootstrap_ca } => setup(&config, bootstrap_ca).await,
    }
}

async fn setup(config: &AppConfig, bootstrap_ca: bool) -> Result<()> {
    let work_dir = &config.ca.work_dir;
    authority::setup(work_dir)
        .with_context(|| format!("Failed to prepare {}", work_dir.display()))?;
    tracing::info!(work_dir = %work_dir.display(), "work directory ready");

    let ca = CertificateAuthority::from_config(&config.ca);
    if bootstrap_ca {
        ca.bootstrap_ca(&config.ca_bootstrap)
            .await
            .context("Failed to generate the CA certificate")?;
    }

    for path in ca.missing_files() {
        tracing::warn!(path = %path.display(), "still missing, provide it before serving");
    }
    Ok(())
}
