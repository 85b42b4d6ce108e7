use std::path::PathBuf;

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::LevelFilter;

use crate::{
    db::DB_FILE,
    notifier::DEFAULT_ALERT_TITLE,
    threshold::{
        DEFAULT_HUMIDITY_MAX, DEFAULT_HUMIDITY_MIN, DEFAULT_TEMPERATURE_MAX,
        DEFAULT_TEMPERATURE_MIN, Thresholds,
    },
    tracker::{DEFAULT_INTERVAL, DEFAULT_TIMEZONE},
};

#[derive(Debug, Parser)]
#[command(version, about = "Cold-chain monitor for CoolShip containers")]
pub struct Args {
    #[arg(long, env = "COOLSHIP_LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,

    #[arg(long, env = "COOLSHIP_LOG_DB", default_value = DB_FILE)]
    pub log_db: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch readings, send alerts and log while tracking is enabled.
    Run(RunArgs),

    /// Inspect logged history.
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, ClapArgs)]
pub struct RunArgs {
    #[arg(long, env = "FIREBASE_DATABASE_URL")]
    pub database_url: String,

    /// Database secret or ID token appended as the `auth` parameter.
    #[arg(long, env = "FIREBASE_DATABASE_AUTH", hide_env_values = true)]
    pub database_auth: Option<String>,

    #[arg(long, env = "FCM_PROJECT_ID")]
    pub fcm_project_id: String,

    /// File holding an OAuth access token for FCM; re-read on every alert.
    #[arg(long, env = "FCM_ACCESS_TOKEN_FILE")]
    pub fcm_access_token_file: PathBuf,

    #[arg(long, env = "COOLSHIP_TIMEZONE", default_value_t = DEFAULT_TIMEZONE)]
    pub timezone: Tz,

    #[arg(
        long,
        env = "COOLSHIP_INTERVAL_SECS",
        default_value_t = DEFAULT_INTERVAL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_secs: u64,

    #[arg(long, env = "COOLSHIP_ALERT_TITLE", default_value = DEFAULT_ALERT_TITLE)]
    pub alert_title: String,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List logged dates, newest first.
    Dates {
        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Print the entries and summary of one date.
    Show {
        date: NaiveDate,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
}

#[derive(Debug, Clone, Copy, ClapArgs)]
pub struct ThresholdArgs {
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE_MIN, allow_negative_numbers = true)]
    pub temperature_min: f64,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE_MAX, allow_negative_numbers = true)]
    pub temperature_max: f64,

    #[arg(long, default_value_t = DEFAULT_HUMIDITY_MIN)]
    pub humidity_min: f64,

    #[arg(long, default_value_t = DEFAULT_HUMIDITY_MAX)]
    pub humidity_max: f64,
}

impl From<ThresholdArgs> for Thresholds {
    fn from(args: ThresholdArgs) -> Self {
        Thresholds {
            temperature_min: args.temperature_min,
            temperature_max: args.temperature_max,
            humidity_min: args.humidity_min,
            humidity_max: args.humidity_max,
        }
    }
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse()
        .map_err(|_| format!("invalid log level: {s} (off, error, warn, info, debug, trace)"))
}
