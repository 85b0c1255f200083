use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use sitex_gateway::{run_site_extension_server, SiteExtensionServerConfig};
use sitex_runtime::FsExtensionManager;

#[derive(Debug, Parser)]
#[command(
    name = "sitex",
    about = "Site extension management API server",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "SITEX_BIND",
        default_value = "127.0.0.1:8585",
        help = "Address the HTTP API listens on"
    )]
    bind: String,

    #[arg(
        long,
        env = "SITEX_FEED_ROOT",
        default_value = ".sitex/feed",
        help = "Directory holding feed entries ({id}.json per extension)"
    )]
    feed_root: PathBuf,

    #[arg(
        long,
        env = "SITEX_INSTALL_ROOT",
        default_value = ".sitex/extensions",
        help = "Directory holding installed extensions ({id}/extension.json)"
    )]
    install_root: PathBuf,

    #[arg(
        long,
        env = "SITEX_SETTINGS_ROOT",
        default_value = ".sitex/settings",
        help = "Directory holding per-extension operation records"
    )]
    settings_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let manager = Arc::new(FsExtensionManager::new(
        cli.feed_root.clone(),
        cli.install_root.clone(),
    ));
    tracing::info!(
        bind = %cli.bind,
        feed_root = %cli.feed_root.display(),
        install_root = %cli.install_root.display(),
        "starting site extension server"
    );

    run_site_extension_server(SiteExtensionServerConfig {
        bind: cli.bind,
        manager,
        settings_root: cli.settings_root,
    })
    .await
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
