use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use zeitportal::auth::{AuthService, SupabaseAuth};
use zeitportal::config;
use zeitportal::monday::{MondayApi, MondayClient};
use zeitportal::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let monday: Arc<dyn MondayApi> = Arc::new(MondayClient::new(cfg.monday.token.clone()));
    let auth: Arc<dyn AuthService> =
        Arc::new(SupabaseAuth::new(&cfg.supabase.url, cfg.supabase.anon_key.clone())?);

    info!("starting zeitportal");
    server::serve(AppState::new(cfg, monday, auth)).await
}
