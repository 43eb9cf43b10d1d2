use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use pg_sql_utils::{
    AcquireSettings, Acquirer, EnvConnectionString, PgConnector, Query, QueryExecutor, Row,
    RowValues, logging,
};
use tracing::Level;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
        }
    }
}

/// Connectivity smoke test: connect using DATABASE_URL and run one query.
#[derive(Parser, Debug)]
#[command(author, version, about = "PostgreSQL connectivity smoke test")]
struct Args {
    #[arg(long, default_value = "SELECT version();")]
    query: String,
    /// Seconds before a single connection attempt gives up
    #[arg(long)]
    connect_timeout: Option<u64>,
    #[arg(long)]
    max_retries: Option<u32>,
    /// Seconds to wait before the first retry; doubles each retry
    #[arg(long)]
    backoff_base: Option<u64>,
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Print every row as JSON instead of the first column of the first row
    #[arg(long)]
    json: bool,
}

impl Args {
    fn settings(&self) -> Result<AcquireSettings, pg_sql_utils::SqlUtilsError> {
        let mut settings = AcquireSettings::from_env()?;
        if let Some(secs) = self.connect_timeout {
            settings = settings.with_connect_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.max_retries {
            settings = settings.with_max_retries(retries);
        }
        if let Some(secs) = self.backoff_base {
            settings = settings.with_backoff_base(Duration::from_secs(secs));
        }
        Ok(settings)
    }
}

fn first_value(rows: &[Row]) -> String {
    match rows.first().and_then(|row| row.get_by_index(0)) {
        Some(RowValues::Text(text)) => text.clone(),
        Some(other) => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
        None => "<no rows>".to_string(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = logging::init(args.log_level.into(), args.log_file.clone()) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    let settings = match args.settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!("Testing database connection...");
    let executor = QueryExecutor::new(Acquirer::new(
        EnvConnectionString::new(),
        PgConnector::new(),
        settings,
    ));

    match executor.execute(&Query::new(args.query.as_str())).await {
        Some(rows) => {
            println!("Successfully connected to PostgreSQL.");
            if args.json {
                match serde_json::to_string_pretty(&rows) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("failed to encode rows: {err}"),
                }
            } else {
                println!("Database version: {}", first_value(&rows));
            }
            ExitCode::SUCCESS
        }
        None => {
            println!("Failed to connect or execute query.");
            ExitCode::FAILURE
        }
    }
}
