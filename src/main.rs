use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use scan_report::{
    app::{ReportPipeline, component_factory::ComponentFactory},
    infra::{ConcreteComponentFactory, default_config_path, load_config},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Collects container image scan findings and renders them into a static report tree.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SCAN_REPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured report root
    #[arg(long)]
    report_root: Option<PathBuf>,

    /// Overrides the configured whole-run deadline, in seconds
    #[arg(long)]
    run_deadline: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);

    let mut config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %config_path.display(), "{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(report_root) = args.report_root {
        config.report_root = report_root;
    }
    if let Some(run_deadline) = args.run_deadline {
        config.run_deadline = Some(run_deadline);
    }

    let pipeline = match ConcreteComponentFactory
        .create_components(&config)
        .and_then(|components| ReportPipeline::from_config(&config, components))
    {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing with the findings collected so far");
                cancel.cancel();
            }
        }
    });

    match pipeline.run(&cancel).await {
        Ok(summary) => {
            info!(?summary, report_root = %config.report_root.display(), "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
