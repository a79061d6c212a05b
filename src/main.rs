use chrono::Utc;
use clap::Parser;
use refresh_jobs::core::staleness;
use refresh_jobs::utils::{logger, validation::Validate};
use refresh_jobs::{
    CliArgs, JobScheduler, RefreshConfig, RefreshJob, ResourceFetcher, TokioEngine, Trigger,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting refresh-jobs");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let config = match RefreshConfig::from_file(&args.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    }) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration failed: {}", e);
            eprintln!("❌ {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    // 整個程序共用同一個 cookie session
    let fetcher = ResourceFetcher::new(&config.http)?;
    let jobs: Vec<RefreshJob> = config
        .jobs
        .iter()
        .map(|job| RefreshJob::new(job, fetcher.clone()))
        .collect();

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be downloaded");
        let now = staleness::now();
        for (job, job_config) in jobs.iter().zip(&config.jobs) {
            let state = if job.is_up_to_date(now) { "fresh" } else { "stale" };
            println!(
                "{:<24} {:<6} every {:>6}s {} -> {}",
                job.name(),
                state,
                job_config.interval_seconds,
                job_config.url,
                job_config.output_path
            );
        }
        return Ok(());
    }

    let engine = Arc::new(TokioEngine::current());
    let scheduler = JobScheduler::from_config(Arc::clone(&engine), &config.schedule);

    let mut failed = 0;
    for job in jobs {
        let name = job.name().to_string();
        let registered = if args.run_now {
            scheduler.start_job(job, Trigger::once(Utc::now()), &name)
        } else {
            scheduler.start_job_hourly(job, &name)
        };
        if !registered {
            failed += 1;
        }
    }
    if failed > 0 {
        tracing::warn!("{} job(s) could not be registered", failed);
    }

    if args.run_now {
        engine.wait().await;
        tracing::info!("✅ All jobs ran once");
    } else {
        tracing::info!("⏰ {} job(s) scheduled, press Ctrl-C to stop", engine.registered().len());
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        engine.shutdown();
    }

    Ok(())
}
