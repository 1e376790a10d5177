mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nicheprobe")]
#[command(about = "Marketplace niche opportunity probe")]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute one controlled pipeline run
    Run {
        /// Cap the number of products processed this run
        #[arg(long, value_name = "N")]
        max_asins: Option<usize>,

        /// Freeze mode: score everything, promote nothing to the shortlist
        #[arg(long)]
        freeze: bool,

        /// Explicitly allow shortlist promotion (the default)
        #[arg(long, overrides_with = "freeze")]
        no_freeze: bool,

        /// Skip category discovery; use products already tracked in the store
        #[arg(long)]
        skip_discovery: bool,

        /// Comma-separated explicit product ids; bypasses discovery and the
        /// freshness filter
        #[arg(long, value_delimiter = ',', value_name = "a,b,c")]
        asins: Option<Vec<String>>,

        /// Also append logs to this file
        #[arg(long, value_name = "PATH")]
        log_file: Option<PathBuf>,
    },
    /// Show the currently served shortlist
    Shortlist {
        /// Emit JSON instead of the console table
        #[arg(long)]
        json: bool,
    },
    /// Database management commands
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Test the database connection
    Ping,
    /// Run pending migrations
    Migrate,
}

fn init_tracing(verbose: bool, log_file: Option<&PathBuf>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| {
        let level =
            std::env::var("NICHEPROBE_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());
        EnvFilter::try_new(level)
    })?;

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Some(Commands::Run { log_file, .. }) => log_file.clone(),
        _ => None,
    };
    let _guard = init_tracing(cli.verbose, log_file.as_ref())?;

    match cli.command {
        Some(Commands::Run {
            max_asins,
            freeze,
            no_freeze,
            asins,
            skip_discovery,
            ..
        }) => {
            let freeze = freeze && !no_freeze;
            let exit = run::run_pipeline(max_asins, freeze, skip_discovery, asins).await?;
            std::process::exit(exit);
        }
        Some(Commands::Shortlist { json }) => {
            run::show_shortlist(json).await?;
        }
        Some(Commands::Db { command }) => match command {
            DbCommands::Ping => run_db_health_check().await?,
            DbCommands::Migrate => run_db_migrate().await?,
        },
        None => println!("nicheprobe: use `run`, `shortlist`, or `db` (see --help)"),
    }

    Ok(())
}

async fn run_db_health_check() -> anyhow::Result<()> {
    let pool = run::connect_or_exit().await;
    nicheprobe_db::health_check(&pool).await?;
    println!("database is healthy");
    Ok(())
}

async fn run_db_migrate() -> anyhow::Result<()> {
    let pool = run::connect_or_exit().await;
    nicheprobe_db::run_migrations(&pool).await?;
    println!("migrations are up to date");
    Ok(())
}
