// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::time::Duration;

use analysisd::adapters::cli::{self, Command, JobsCommand};
use analysisd::adapters::db::{JobStore, SqliteJobTracker};
use analysisd::adapters::fs::LocalFilesystem;
use analysisd::adapters::process::LocalCommandExec;
use analysisd::adapters::slurm::SlurmScheduler;
use analysisd::adapters::time::SystemClock;
use analysisd::app::ports::JobTrackerPort;
use analysisd::app::usecases::UseCases;
use analysisd::{config, logging};

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), source) => tracing::info!(
            "config path: {} (source={}, present={})",
            path.display(),
            source.map(|s| s.as_str()).unwrap_or("-"),
            report.config_file_present
        ),
        (None, _) => tracing::info!("config path: (none)"),
    }
    tracing::info!(
        "config database_path: {} (source={})",
        report.database_path.value.display(),
        report.database_path.source.as_str()
    );
    tracing::info!(
        "config partition: {} (source={})",
        report.partition.value.as_deref().unwrap_or("(unset)"),
        report.partition.source.as_str()
    );
    tracing::info!(
        "config job_check_interval_secs: {} (source={})",
        report.job_check_interval_secs.value,
        report.job_check_interval_secs.source.as_str()
    );
    tracing::info!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(usecases: UseCases, interval: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    tracing::info!("checking tracked jobs every {}s", interval.as_secs());
    loop {
        tokio::select! {
            _ = ticker.tick() => match usecases.reconcile_tracked_jobs().await {
                Ok(summary) if summary.checked > 0 => tracing::info!(
                    checked = summary.checked,
                    changed = summary.changed,
                    errors = summary.errors,
                    "job check finished"
                ),
                Ok(_) => {}
                Err(err) => tracing::warn!("job check failed: {err}"),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_jobs(usecases: &UseCases, command: JobsCommand) -> anyhow::Result<()> {
    match command {
        JobsCommand::List { .. } => {
            let filters = command.filters().unwrap_or_default();
            print_json(&usecases.list_analyses("", filters).await?)
        }
        JobsCommand::Show { job_id, user } => {
            let meta = usecases
                .analysis_metadata(&job_id, user.as_deref().unwrap_or_default())
                .await?;
            print_json(&meta)
        }
        JobsCommand::Status { job_id, user } => {
            let status = usecases
                .job_status(&job_id, user.as_deref().unwrap_or_default())
                .await?;
            print_json(&serde_json::json!({ "job_id": job_id, "status": status }))
        }
        JobsCommand::Cancel { job_id, user } => {
            let status = usecases
                .cancel_analysis(&job_id, user.as_deref().unwrap_or_default())
                .await?;
            print_json(&serde_json::json!({ "job_id": job_id, "status": status }))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli::ParsedOpts {
        opts,
        verbose_override,
    } = cli::parse_opts();
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            partition: opts.partition,
            job_check_interval_secs: opts.job_check_interval_secs,
            verbose: verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);
    config::ensure_database_dir(&config.database_path)?;

    let store = JobStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    let tracker = Arc::new(SqliteJobTracker::new(store));
    let scheduler = Arc::new(SlurmScheduler::new(
        config.slurm_config(),
        Arc::new(LocalCommandExec::new()),
        tracker.clone(),
    ));
    let usecases = UseCases::new(
        scheduler,
        tracker.clone(),
        Arc::new(LocalFilesystem::new()),
        Arc::new(SystemClock::new()),
    );

    let result = match opts.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            serve(
                usecases,
                Duration::from_secs(config.job_check_interval_secs),
            )
            .await
        }
        Command::Health => {
            let report = usecases.check_health().await;
            let printed = print_json(&serde_json::json!({
                "healthy": report.healthy,
                "detail": report.detail,
                "error": report.error.as_ref().map(|err| err.to_string()),
            }));
            match printed {
                Ok(()) if !report.healthy => Err(anyhow::anyhow!("scheduler is unhealthy")),
                other => other,
            }
        }
        Command::Jobs { command } => run_jobs(&usecases, command).await,
    };
    tracker.close().await;
    result
}
