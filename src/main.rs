use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use adaptive_extractor::{Config, ProfileFinder};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting adaptive profile extractor");

    let schedule = config.schedule.clone();
    let finder = ProfileFinder::new(config).await?;

    if let Err(e) = finder.check_targets().await {
        error!("Error during initial run: {}", e);
    }

    let sched = JobScheduler::new().await?;

    let job_finder = finder.clone();
    sched
        .add(Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let finder = job_finder.clone();
            Box::pin(async move {
                if let Err(e) = finder.check_targets().await {
                    error!("Error scraping targets: {}", e);
                }
                finder.optimize().await;
            })
        })?)
        .await?;

    info!(schedule = %schedule, "Scheduler started");
    sched.start().await?;

    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
    }
}
