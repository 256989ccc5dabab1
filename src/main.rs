mod account;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod network;
mod notify;
mod orchestrator;
mod report;
mod splits;
mod store;
mod treasury;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppSettings;
use crate::error::AppResult;
use crate::report::RunReport;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,autodripper=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenv::dotenv().ok();

    let settings = AppSettings::from_env()?;

    if !settings.should_run {
        info!("Distribution agent is disabled. Exiting...");
        return Ok(());
    }

    info!(
        "🚀 Starting autodripper on {} (dry run: {})",
        settings.network.name, settings.dry_run
    );

    let app = bootstrap::initialize(&settings).await?;

    // The wallet must be funded before the first write; a failed top-up
    // aborts the run, but the (empty) report is still emitted.
    let report = match ensure_funded(&app, &settings).await {
        Ok(()) => app.orchestrator.run().await,
        Err(e) => {
            error!("Treasury top-up failed: {e}");
            RunReport::aborted(
                settings.network.name,
                settings.network.symbol,
                settings.dry_run,
                e.to_string(),
            )
        }
    };

    app.reporter.emit(&report).await;

    // Release the database pool on every exit path.
    app.pool.close().await;

    if !report.succeeded() {
        std::process::exit(1);
    }

    Ok(())
}

async fn ensure_funded(app: &bootstrap::App, settings: &AppSettings) -> AppResult<()> {
    if !settings.should_try_auto_top_up {
        return Ok(());
    }

    if settings.dry_run {
        info!("Skipping treasury top-up in dry-run mode.");
        return Ok(());
    }

    match &app.balancer {
        Some(balancer) => balancer.ensure_sufficient_balance().await,
        // Bootstrap rejects the no-wallet, non-dry-run combination, so a
        // missing balancer here can only mean dry-run, handled above.
        None => Ok(()),
    }
}
