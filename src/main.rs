use std::{path::Path, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use args::{Args, Command, HistoryCommand, RunArgs};
use backon::BlockingRetryable;
use backon::ConstantBuilder;
use clap::Parser as _;
use db::DB;
use log::LevelFilter;
use notifier::Notifier;
use push::FcmPusher;
use rtdb::RealtimeDb;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use threshold::Thresholds;
use tracker::Tracker;

mod args;
mod db;
#[cfg(test)]
mod fake;
mod history;
mod log_entry;
mod notifier;
mod push;
mod reading;
mod rtdb;
mod store;
mod threshold;
mod tracker;
mod watch;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logger(args.log_level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = run(args).await {
        log::error!("{e:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_logger(level: LevelFilter) -> Result<(), anyhow::Error> {
    TermLogger::init(
        level,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")
}

pub async fn run(args: Args) -> Result<(), anyhow::Error> {
    match args.command {
        Command::Run(run_args) => serve(run_args, &args.log_db).await,
        Command::History(command) => show_history(command, &args.log_db),
    }
}

async fn serve(args: RunArgs, log_db: &Path) -> Result<(), anyhow::Error> {
    let retry_builder = ConstantBuilder::default()
        .with_delay(Duration::from_millis(500))
        .with_max_times(20);

    let db = (|| {
        let db = DB::open(log_db)?;
        db.init()?;
        Ok::<_, anyhow::Error>(db)
    })
    .retry(retry_builder)
    .notify(|e, dur| {
        log::error!("{e:#}");
        log::info!("Retrying in {:?}", dur);
    })
    .call()
    .context("Failed to initialize log database")?;

    let rtdb = RealtimeDb::new(&args.database_url, args.database_auth)
        .context("Failed to initialize realtime database client")?;
    let pusher = FcmPusher::new(&args.fcm_project_id, args.fcm_access_token_file)
        .context("Failed to initialize push client")?;

    let notifier = Arc::new(Notifier::new(
        rtdb.clone(),
        pusher,
        Thresholds::from(args.thresholds),
        args.alert_title,
    ));
    let tracker = Tracker::new(rtdb.clone(), db, args.timezone);
    let interval = Duration::from_secs(args.interval_secs);

    log::info!(
        "Logging every {:?} in {} into {}",
        interval,
        args.timezone,
        log_db.display()
    );

    let tracking = tokio::spawn(async move { tracker.run(interval).await });
    let mut watching = tokio::spawn(async move {
        watch::watch(&rtdb, notifier, watch::reconnect_builder()).await
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to wait for Ctrl+C signal")?;
            log::info!("Shutting down");
            watching.abort();
        }
        watched = &mut watching => {
            watched.context("Watcher task failed")?;
        }
    }

    tracking.abort();

    Ok(())
}

fn show_history(command: HistoryCommand, log_db: &Path) -> Result<(), anyhow::Error> {
    let db = DB::open_read_only(log_db)
        .with_context(|| format!("Failed to open log database {}", log_db.display()))?;

    match command {
        HistoryCommand::Dates { from, to } => {
            for date in db.dates(from, to).context("Failed to list dates")? {
                println!("{date}");
            }
        }
        HistoryCommand::Show { date, thresholds } => {
            let date = date.format(log_entry::DATE_FORMAT).to_string();
            let entries = db
                .entries(&date)
                .with_context(|| format!("Failed to read entries for {date}"))?;

            if entries.is_empty() {
                println!("No log data for {date}");
                return Ok(());
            }

            for (key, entry) in &entries {
                println!(
                    "{}  {:>6.1}°C  {:>5.1}%  {:.6},{:.6}  {}",
                    key.time,
                    entry.temperature,
                    entry.humidity,
                    entry.location.lat,
                    entry.location.lng,
                    entry.timestamp.to_rfc3339(),
                );
            }

            let summary = history::summarize(&entries, &Thresholds::from(thresholds));
            println!();
            println!(
                "{} entries from {} to {}, {} out of range",
                summary.entries,
                summary.first.as_deref().unwrap_or("-"),
                summary.last.as_deref().unwrap_or("-"),
                summary.out_of_range,
            );
            if let Some(t) = summary.temperature {
                println!("Temperature: {:.1}°C to {:.1}°C", t.min, t.max);
            }
            if let Some(h) = summary.humidity {
                println!("Humidity: {:.1}% to {:.1}%", h.min, h.max);
            }
            println!("Route: {} points", summary.route.len());
        }
    }

    Ok(())
}
