//! skyupload command-line entry point.
//!
//! Usage: `skyupload <path> [remote-name]`. The access token is read from
//! `SKYUPLOAD_ACCESS_TOKEN`.

mod config;

use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use skyupload_client::{Error, GraphClient, LargeFileUpload, StaticToken};
use skyupload_transfer::{FileInfo, UploadProgress};

const TOKEN_ENV: &str = "SKYUPLOAD_ACCESS_TOKEN";
const USAGE: &str = "usage: skyupload <path> [remote-name]";

/// Parsed command line.
#[derive(Debug, PartialEq)]
struct Args {
    path: PathBuf,
    remote_name: Option<String>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut args = args.into_iter();
        let path = args.next().context(USAGE)?;
        let remote_name = args.next();
        if args.next().is_some() {
            anyhow::bail!(USAGE);
        }
        Ok(Self {
            path: PathBuf::from(path),
            remote_name,
        })
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let token = std::env::var(TOKEN_ENV).with_context(|| format!("{TOKEN_ENV} is not set"))?;

    let config = config::Config::load()?;
    tracing::debug!(folder = %config.folder_id, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args, token))
}

async fn run(config: config::Config, args: Args, token: String) -> anyhow::Result<()> {
    let client = GraphClient::new(StaticToken::new(token))?
        .with_base_url(&config.base_url)
        .with_timeout(config.upload.request_timeout());

    let file = FileInfo::from_path(&config.folder_id, &args.path, args.remote_name)
        .await
        .with_context(|| format!("cannot read {}", args.path.display()))?;
    info!(name = %file.name, size = file.size, "uploading");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling upload");
            interrupt.cancel();
        }
    });

    let item = LargeFileUpload::new(&client, file, config.upload)
        .with_cancellation(cancel)
        .with_progress(Box::new(log_progress))
        .upload()
        .await
        .map_err(describe_failure)?;

    println!(
        "{}\t{}\t{}",
        item.id,
        item.name,
        item.quick_xor_hash().unwrap_or("-")
    );
    Ok(())
}

/// Adds a hint to failures caused by a rejected access token.
fn describe_failure(err: Error) -> anyhow::Error {
    if err.is_authentication() {
        anyhow::Error::new(err).context(format!("access token rejected, refresh {TOKEN_ENV}"))
    } else {
        err.into()
    }
}

fn log_progress(progress: UploadProgress) {
    info!(
        name = %progress.name,
        percent = format_args!("{:.1}", progress.percentage()),
        kib_per_sec = format_args!("{:.0}", progress.bytes_per_second / 1024.0),
        chunk_size = progress.chunk_size,
        eta_secs = ?progress.eta_secs,
        "progress"
    );
}
