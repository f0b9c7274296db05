//! DJ set prep engine: ingest/job scheduler, metadata store, Set
//! Planner, and Exporter Suite behind an HTTP API.

use anyhow::Result;
use clap::{Parser, Subcommand};
use djprep_engine::analyzer_client::TcpAnalyzerClient;
use djprep_engine::config::{CliOverrides, Config};
use djprep_engine::db::content_store::ContentStore;
use djprep_engine::db::schema;
use djprep_engine::export::verify::verify_bundle;
use djprep_engine::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "engine")]
#[command(about = "DJ set prep copilot engine core")]
#[command(version)]
struct Args {
    /// Directory holding the SQLite database, blob store, and exports
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<String>,

    /// HTTP API port
    #[arg(long)]
    http_port: Option<u16>,

    /// Port the engine listens on for its own RPC surface, if any
    #[arg(long)]
    rpc_port: Option<u16>,

    /// `host:port` of the Analyzer Worker this engine dispatches jobs to
    #[arg(long)]
    analyzer_addr: Option<String>,

    /// Tracing filter, e.g. "info" or "djprep_engine=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Require bearer-token auth on every request
    #[arg(long)]
    auth: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify an export bundle's checksums against its files on disk
    VerifyBundle {
        /// Path to the export directory containing checksums.txt
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                args.log_level
                    .clone()
                    .unwrap_or_else(|| "info".to_string())
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(&CliOverrides {
        data_dir: args.data_dir.clone(),
        http_port: args.http_port,
        rpc_port: args.rpc_port,
        analyzer_addr: args.analyzer_addr.clone(),
        log_level: args.log_level.clone(),
        auth: args.auth,
    })
    .await?;

    if let Some(Command::VerifyBundle { dir }) = &args.command {
        let report = verify_bundle(dir)?;
        println!(
            "checked {}, mismatched {}, missing {}",
            report.checked,
            report.mismatched.len(),
            report.missing.len()
        );
        std::process::exit(if report.is_ok() { 0 } else { 1 });
    }

    info!("starting engine, data_dir={}", config.data_dir.display());

    let pool = match djprep_common::db::open_pool(&config.db_path()).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("failed to open database: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = schema::initialize(&pool).await {
        error!("failed to initialize schema: {e}");
        std::process::exit(2);
    }

    let store = ContentStore::new(config.blobs_dir());
    let analyzer = Arc::new(TcpAnalyzerClient::new(
        config.analyzer_addr.clone(),
        Duration::from_secs(120),
    ));

    let state = AppState::new(pool, store, analyzer, config.clone());

    tokio::spawn({
        let scheduler = state.scheduler.clone();
        async move {
            loop {
                if let Err(e) = scheduler.run_cycle().await {
                    error!("scheduler cycle failed: {e}");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    let app = djprep_engine::build_router(state);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {addr}: {e}");
            std::process::exit(2);
        }
    };
    info!("listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
