//! Qualifying Replay CLI Application
//!
//! This is the command-line front end for the qualifying replay engine.
//! It uses the quali-replay library and adds:
//! - TOML configuration with command-line overrides
//! - An on-disk archive of OpenF1 JSON documents as the timing source
//! - A background lap-fetch worker fed over channels
//! - A text leaderboard printed while the session plays

use anyhow::{Context, Result};
use clap::Parser;
use quali_replay::{load_session, LoadProgress};
use std::path::PathBuf;
use std::time::Duration;

mod archive;
mod config;
mod report;
mod runner;

use archive::JsonArchive;
use config::AppConfig;
use runner::{FetchWorker, RunOptions};

/// Qualifying Replay - Replay archived qualifying sessions as a live leaderboard
#[derive(Parser, Debug)]
#[command(name = "quali-replay")]
#[command(about = "Replay archived qualifying sessions as a live timing leaderboard", long_about = None)]
#[command(version)]
struct Args {
    /// Directory holding the archived session documents
    #[arg(short, long, value_name = "DIR")]
    archive: Option<PathBuf>,

    /// Country of the event (e.g. "Bahrain")
    #[arg(long)]
    country: Option<String>,

    /// Session name (e.g. "Qualifying", "Sprint Qualifying")
    #[arg(long, value_name = "NAME")]
    session: Option<String>,

    /// Season year
    #[arg(long)]
    year: Option<i32>,

    /// Playback speed multiplier
    #[arg(short, long)]
    speed: Option<f64>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the final standings as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Qualifying Replay CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using replay library v{}", quali_replay::VERSION);

    let config = resolve_config(&args)?;
    replay(&config, &args)
}

/// Config file (if any) with command-line overrides applied
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if let Some(dir) = &args.archive {
        config.archive.dir = dir.clone();
    }
    if let Some(country) = &args.country {
        config.session.country = country.clone();
    }
    if let Some(session) = &args.session {
        config.session.session_name = session.clone();
    }
    if let Some(year) = args.year {
        config.session.year = year;
    }
    if let Some(speed) = args.speed {
        if !(speed.is_finite() && speed > 0.0) {
            anyhow::bail!("Playback speed must be positive, got {}", speed);
        }
        config.replay.speed = speed;
    }
    if args.json || args.quiet {
        config.playback.print_every = 0;
    }

    Ok(config)
}

/// Load the session, play it to the end and print the final standings
fn replay(config: &AppConfig, args: &Args) -> Result<()> {
    let query = config.session.query();
    let archive = JsonArchive::new(&config.archive.dir);

    let mut engine = load_session(&archive, &query, config.replay.clone(), |progress: &LoadProgress| {
        log::info!("{}", progress);
    })
    .with_context(|| {
        format!(
            "Failed to load {} {} {} from {:?}",
            query.year,
            query.country,
            query.session_name,
            archive.root()
        )
    })?;

    let session = engine.session().clone();
    log::info!(
        "Loaded session {} ({} drivers, {} lap events)",
        session.session_key,
        engine.drivers().len(),
        engine.queue().len()
    );

    let mut worker = FetchWorker::spawn(archive, session.session_key)?;
    let options = RunOptions {
        frame: Duration::from_millis(config.playback.frame_ms.max(1)),
        print_every: config.playback.print_every,
        rows: config.playback.rows,
    };
    runner::run(&mut engine, &worker, options);
    worker.shutdown();

    if args.json {
        let standings = engine.standings();
        println!(
            "{}",
            serde_json::to_string_pretty(&standings).context("Failed to serialize standings")?
        );
    } else if !args.quiet {
        println!("{}", report::render(&engine, 0));
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
