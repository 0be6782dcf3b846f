use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info};

use tennis_ingestion::api::EventsApi;
use tennis_ingestion::feed::ChangeFeed;
use tennis_ingestion::health::{self, HealthState};
use tennis_ingestion::pipeline::dump_day;
use tennis_ingestion::retry::RetryPolicy;
use tennis_ingestion::{
    Config, IngestSettings, Ingestor, MemoryStore, PgStore, RunConfig, Store,
};

#[derive(Parser)]
#[command(name = "tennis-ingestion")]
#[command(version, about = "Ingest tennis matches, sets and statistics into Postgres", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every match scheduled between two dates, both included
    Ingest {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// Do not fetch per-match statistics
        #[arg(long)]
        skip_statistics: bool,

        /// Use an in-process store instead of DATABASE_URL
        #[arg(long)]
        memory: bool,
    },

    /// Refresh statistics of one ingested match
    Stats {
        /// External event id
        #[arg(long)]
        event: i64,
    },

    /// Print row counts of every table
    Counts,

    /// Delete every ingested row
    Purge {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Write raw events and statistics of one date as JSON lines
    Dump {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Output file
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tennis_ingestion=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Ingest {
            from,
            to,
            skip_statistics,
            memory,
        } => ingest(&config, from, to, skip_statistics, memory).await,
        Commands::Stats { event } => {
            let store = connect_store(&config).await?;
            let ingestor = Ingestor::new(
                EventsApi::new(&config.api)?,
                store,
                IngestSettings::from(&config),
            );
            let rows = ingestor.ingest_statistics(event).await?;
            println!("{} statistics rows stored for event {}", rows, event);
            Ok(())
        }
        Commands::Counts => {
            let store = connect_store(&config).await?;
            println!("{}", store.counts().await?);
            Ok(())
        }
        Commands::Purge { yes } => {
            if !yes {
                bail!("purge deletes every ingested row; rerun with --yes to confirm");
            }
            let store = connect_store(&config).await?;
            store.purge().await?;
            println!("All ingested rows deleted");
            Ok(())
        }
        Commands::Dump { date, out } => {
            let api = EventsApi::new(&config.api)?;
            let file = File::create(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let mut writer = BufWriter::new(file);
            let count = dump_day(&api, &config.retry, date, &mut writer).await?;
            writer.flush()?;
            println!("{} events written to {}", count, out.display());
            Ok(())
        }
    }
}

async fn connect_store(config: &Config) -> Result<PgStore> {
    PgStore::connect(config.require_database_url()?, &RetryPolicy::connect()).await
}

async fn ingest(
    config: &Config,
    from: NaiveDate,
    to: NaiveDate,
    skip_statistics: bool,
    memory: bool,
) -> Result<()> {
    let run = RunConfig::new(from, to, config.retry.clone(), config.max_range_days)?;
    let api = EventsApi::new(&config.api)?;
    let settings = IngestSettings {
        fetch_statistics: !skip_statistics,
        ..IngestSettings::from(config)
    };

    let health_state = HealthState::new();
    if let Some(port) = config.health_port {
        spawn_health_server(port, health_state.clone()).await?;
    }

    info!("Ingesting {} through {} ({} days)", from, to, run.day_count());

    if memory {
        let ingestor = Ingestor::new(api, MemoryStore::new(), settings).with_health(health_state);
        let ingestor = attach_feed(ingestor, config).await?;
        run_ingest(&ingestor, &run).await
    } else {
        let store = connect_store(config).await?;
        let ingestor = Ingestor::new(api, store, settings).with_health(health_state);
        let ingestor = attach_feed(ingestor, config).await?;
        run_ingest(&ingestor, &run).await
    }
}

async fn attach_feed<S: Store>(ingestor: Ingestor<S>, config: &Config) -> Result<Ingestor<S>> {
    match &config.redis_url {
        Some(url) => Ok(ingestor.with_feed(ChangeFeed::connect(url, &RetryPolicy::connect()).await?)),
        None => Ok(ingestor),
    }
}

async fn run_ingest<S: Store>(ingestor: &Ingestor<S>, run: &RunConfig) -> Result<()> {
    match ingestor.ingest_range(run).await {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            println!("{}", ingestor.store().counts().await?);
            Ok(())
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            Err(e.into())
        }
    }
}

async fn spawn_health_server(port: u16, health_state: HealthState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {}", addr))?;
    info!("Health endpoint listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health::router(health_state)).await {
            error!("Health endpoint stopped: {}", e);
        }
    });
    Ok(())
}
