use anyhow::Result;
use clap::Parser;
use log::{error, info};

use golftracker::config::Config;
use golftracker::golf::GolfEmailProcessor;

#[derive(Parser)]
#[command(name = "golftracker")]
#[command(about = "Mail client that extracts golf tee-time confirmations into a CSV ledger")]
#[command(version = "0.1.0")]
struct Args {
    /// Dry-run mode: analyze emails without writing the ledger
    #[arg(short, long)]
    dry_run: bool,

    /// Daemon mode: run on the configured schedule
    #[arg(long)]
    daemon: bool,

    /// Ledger output file (default: ./emails.csv)
    #[arg(short = 'o', long, default_value = "./emails.csv")]
    output: String,

    /// Limit the number of emails to process (default: unlimited)
    #[arg(short = 'l', long)]
    limit: Option<usize>,

    /// Check the configuration without connecting
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load the .env file if present
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    env_logger::init();

    if args.dry_run {
        info!("🧪 Starting golftracker in DRY-RUN mode");
    } else {
        info!("🚀 Starting golftracker");
    }

    // Load the configuration
    let mut config = Config::new()?;

    // If requested, only check the configuration
    if args.check_config {
        println!("✅ Configuration valid!");
        println!("📧 Gmail API OAuth2");
        println!("🔑 Credentials: {}", config.gmail.credentials_path);
        println!("💾 Token cache: {}", config.gmail.token_cache_path);
        println!("🤖 Extraction model: {} @ {}", config.openai.model, config.openai.base_url);
        println!("🔍 Search query: {}", config.search.query);
        if !args.dry_run {
            println!("📒 Ledger: {}", config.ledger.output_path);
        }
        return Ok(());
    }

    // Override the ledger path from the CLI when provided
    if args.output != "./emails.csv" {
        config.ledger.output_path = args.output.clone();
    }

    // Daemon mode
    if args.daemon {
        info!("🔄 Starting in daemon mode");
        run_daemon_mode(config, args).await?;
        return Ok(());
    }

    // One-shot mode (default behavior)
    let result = if args.dry_run {
        // Dry-run mode: no ledger writes
        let processor = GolfEmailProcessor::new_dry_run(config)?;
        processor.process_emails_dry_run(args.limit).await
    } else {
        // Production mode: with CSV ledger
        let processor = GolfEmailProcessor::new(config)?;
        processor.process_emails(args.limit).await
    };

    match result {
        Ok(count) => {
            if args.dry_run {
                info!("✅ Dry-run analysis finished successfully. {} emails analyzed.", count);
            } else {
                info!("✅ Processing finished successfully. {} emails processed.", count);
            }
        }
        Err(e) => {
            error!("❌ Error while processing emails: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

async fn run_daemon_mode(config: Config, args: Args) -> Result<()> {
    use chrono::{Local, Timelike};
    use tokio_cron_scheduler::{Job, JobScheduler};

    // The scheduler must be enabled in the configuration
    if !config.scheduler.enabled {
        error!("❌ Daemon mode requires SCHEDULER_ENABLED=true in the configuration");
        anyhow::bail!("Scheduler not enabled in configuration");
    }

    if config.scheduler.schedule_times.is_empty() {
        error!("❌ No schedule times defined (SCHEDULER_TIMES)");
        anyhow::bail!("No schedule times defined");
    }

    info!("📅 Configured schedule times: {:?}", config.scheduler.schedule_times);

    // Create the scheduler
    let scheduler = JobScheduler::new().await?;

    // Add one job per configured time
    for schedule_time in &config.scheduler.schedule_times {
        let parts: Vec<&str> = schedule_time.split(':').collect();
        if parts.len() != 2 {
            error!("❌ Invalid schedule time format: {}. Use HH:MM", schedule_time);
            continue;
        }

        let hour = parts[0];
        let minute = parts[1];

        // Cron format: "0 minute hour * * *" (every day)
        let cron_expr = format!("0 {} {} * * *", minute, hour);
        info!("📆 Adding scheduled job: {} (cron: {})", schedule_time, cron_expr);

        // Clone what the closure needs
        let config_clone = config.clone();
        let dry_run = args.dry_run;
        let limit = args.limit;
        let schedule_time_clone = schedule_time.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _l| {
            let config = config_clone.clone();
            let schedule_time = schedule_time_clone.clone();

            Box::pin(async move {
                info!("⏰ Scheduled run at {} - fetching emails...", schedule_time);

                let result = if dry_run {
                    let processor = match GolfEmailProcessor::new_dry_run(config) {
                        Ok(p) => p,
                        Err(e) => {
                            error!("❌ Error creating the processor: {}", e);
                            return;
                        }
                    };
                    processor.process_emails_dry_run(limit).await
                } else {
                    let processor = match GolfEmailProcessor::new(config) {
                        Ok(p) => p,
                        Err(e) => {
                            error!("❌ Error creating the processor: {}", e);
                            return;
                        }
                    };
                    processor.process_emails(limit).await
                };

                match result {
                    Ok(count) => {
                        info!("✅ Scheduled run finished. {} emails processed at {}", count, schedule_time);
                    }
                    Err(e) => {
                        error!("❌ Error during scheduled run at {}: {}", schedule_time, e);
                    }
                }
            })
        })?;

        scheduler.add(job).await?;
    }

    // Start the scheduler
    scheduler.start().await?;

    info!("✅ Daemon mode started. Waiting for scheduled times...");
    info!("📋 Next runs: {:?}", config.scheduler.schedule_times);
    info!("⏸️  Press Ctrl+C to stop the daemon");

    // Keep the process alive
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;

        // Periodic heartbeat to show the daemon is alive
        let now = Local::now();
        if now.minute() == 0 {
            info!("💓 Daemon active - {}", now.format("%Y-%m-%d %H:%M"));
        }
    }
}
