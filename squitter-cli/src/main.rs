//! squitter: command-line Mode S / ADS-B decoder and tracker.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use squitter_core::config::{self, Config};
use squitter_core::tracker::Update;
use squitter_core::*;

mod source;

#[derive(Parser)]
#[command(name = "squitter", version, about = "Mode S / ADS-B decoder and tracker")]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default ~/.squitter/config.toml)
    #[arg(long, global = true, env = "SQUITTER_CONFIG")]
    config: Option<PathBuf>,

    /// Receiver latitude, used to resolve surface positions
    #[arg(long, global = true, allow_negative_numbers = true)]
    ref_lat: Option<f64>,

    /// Receiver longitude
    #[arg(long, global = true, allow_negative_numbers = true)]
    ref_lon: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode frames one at a time and print an aircraft table
    Decode {
        /// File with one frame per line, or "-" for stdin
        file: PathBuf,

        /// Print every decoded frame as a JSON line instead of the table
        #[arg(long)]
        json: bool,

        /// Input is a binary Beast stream
        #[arg(long)]
        beast: bool,
    },

    /// Track aircraft through the concurrent pipeline
    Track {
        /// File with one frame per line, or "-" for stdin
        file: PathBuf,

        /// Stream tracker events as JSON lines instead of the final table
        #[arg(long)]
        events: bool,

        /// Input is a binary Beast stream
        #[arg(long)]
        beast: bool,

        /// Decode workers (overrides the config file)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    };
    if cli.ref_lat.is_some() {
        config.receiver.lat = cli.ref_lat;
    }
    if cli.ref_lon.is_some() {
        config.receiver.lon = cli.ref_lon;
    }

    let result = match cli.command {
        Commands::Decode { file, json, beast } => cmd_decode(&config, file, json, beast).await,
        Commands::Track {
            file,
            events,
            beast,
            workers,
        } => {
            if let Some(workers) = workers {
                config.pipeline.workers = workers;
            }
            cmd_track(&config, file, events, beast).await
        }
        Commands::Config { save } => cmd_config(&config, cli.config.as_deref(), save),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON output on stdout stays clean.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_decode(config: &Config, file: PathBuf, json: bool, beast: bool) -> Result<()> {
    let (mut frames, reader) = source::spawn(file, beast, config.pipeline.queue_size);
    let tracker = Tracker::new(config.tracker.clone(), config.receiver.reference());

    while let Some(input) = frames.recv().await {
        let Some(update) = tracker.decode_input(&input) else {
            continue;
        };
        if json {
            match &update {
                Update::ModeS { frame, .. } => print_json(frame),
                Update::Sbs1(frame) => print_json(frame),
            }
        }
        tracker.apply_update(&update, || {});
    }
    finish_reader(reader).await?;

    if !json {
        let stats = tracker.stats();
        println!();
        println!(
            "Frames: {} read, {} decoded, {} dropped, {} aircraft",
            stats.frames_received, stats.frames_decoded, stats.frames_dropped, stats.aircraft
        );
        print_aircraft(tracker.snapshots());
    }
    Ok(())
}

async fn cmd_track(config: &Config, file: PathBuf, stream_events: bool, beast: bool) -> Result<()> {
    let tracker = Arc::new(Tracker::new(
        config.tracker.clone(),
        config.receiver.reference(),
    ));
    let prune_every = Duration::from_secs(config.tracker.prune_interval_secs);
    let (pipeline, mut events) =
        Pipeline::start(Arc::clone(&tracker), &config.pipeline, prune_every);

    // Always drain events, or the workers stall once the queue fills
    let printer = tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(event) = events.recv().await {
            count += 1;
            if stream_events {
                print_json(&event);
            }
        }
        count
    });

    let (mut frames, reader) = source::spawn(file, beast, config.pipeline.queue_size);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut interrupted = false;
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => pipeline.submit(frame).await?,
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("interrupted, draining queued frames");
                interrupted = true;
                break;
            }
        }
    }
    drop(frames);

    let stats = pipeline.shutdown().await;
    let event_count = printer.await.unwrap_or_else(|e| {
        warn!(error = %e, "event printer failed");
        0
    });
    if interrupted {
        reader.abort();
    } else {
        finish_reader(reader).await?;
    }

    if !stream_events {
        println!();
        println!("Track complete");
        println!(
            "  Frames: {} read, {} decoded, {} dropped",
            stats.frames_received, stats.frames_decoded, stats.frames_dropped
        );
        println!("  Positions: {} resolved", stats.positions_resolved);
        println!("  Events: {event_count}");
        println!("  Aircraft: {}", stats.aircraft);
        print_aircraft(tracker.snapshots());
    }
    Ok(())
}

fn cmd_config(config: &Config, path: Option<&Path>, save: bool) -> Result<()> {
    print!("{}", config::serialize_config(config)?);
    if save {
        let written = match path {
            Some(path) => {
                config::save_config_to(config, path)?;
                path.to_path_buf()
            }
            None => config::save_config(config)?,
        };
        eprintln!("Saved {}", written.display());
    }
    Ok(())
}

async fn finish_reader(reader: JoinHandle<Result<()>>) -> Result<()> {
    match reader.await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "input reader failed");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "cannot serialize output"),
    }
}

fn print_aircraft(mut aircraft: Vec<AircraftSnapshot>) {
    if aircraft.is_empty() {
        return;
    }
    aircraft.sort_by_key(|a| std::cmp::Reverse(a.message_count));

    let mut table = Table::new();
    table.set_header(vec![
        "ICAO", "Callsign", "Squawk", "Alt (ft)", "Speed (kts)", "Hdg", "VRate", "Lat", "Lon",
        "Status", "Msgs",
    ]);

    for ac in &aircraft {
        let position = ac.position.as_ref();
        table.add_row(vec![
            Cell::new(icao_to_string(&ac.icao)),
            Cell::new(ac.callsign.as_deref().unwrap_or("-")),
            Cell::new(ac.squawk.as_deref().unwrap_or("-")),
            Cell::new(
                ac.altitude
                    .map(|a| a.value.to_string())
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.speed
                    .map(|s| format!("{:.0}", s.knots))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.heading
                    .map(|h| format!("{h:.1}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                ac.vertical_rate
                    .map(|v| format!("{v:+}"))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                position
                    .map(|p| format!("{:.4}", p.lat))
                    .unwrap_or("-".into()),
            ),
            Cell::new(
                position
                    .map(|p| format!("{:.4}", p.lon))
                    .unwrap_or("-".into()),
            ),
            Cell::new(status_text(ac)),
            Cell::new(ac.message_count),
        ]);
    }

    println!();
    println!("{table}");
}

fn status_text(ac: &AircraftSnapshot) -> &'static str {
    if let Some(emergency) = ac.emergency {
        return emergency;
    }
    if let Some(special) = ac.special {
        return special;
    }
    match ac.on_ground {
        Some(true) => "ground",
        Some(false) => "airborne",
        None => "-",
    }
}
