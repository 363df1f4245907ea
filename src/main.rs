use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use parkwatch::{ParkwatchApp, ParkwatchConfig};

#[derive(Parser, Debug)]
#[command(name = "parkwatch")]
#[command(about = "Camera ingestion and parking zone occupancy monitoring")]
#[command(version)]
#[command(long_about = "Parkwatch reads frames from network and local cameras, recovering \
from unreliable streams and snapshot endpoints, and evaluates parking zone occupancy from \
vehicle detections.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parkwatch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write JSON logs to daily rolling files in this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor every configured camera until interrupted (default)
    Run,

    /// Capture one JPEG from a camera
    Snapshot {
        #[arg(long)]
        camera: String,

        #[arg(long, default_value = "snapshot.jpg")]
        out: PathBuf,

        /// How long to wait for the first frame
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },

    /// Print the parking status of a camera as JSON
    Status {
        #[arg(long)]
        camera: String,

        /// How long to wait for a frame to evaluate
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting Parkwatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ParkwatchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate().context("Invalid configuration")?;

    let mut app = ParkwatchApp::new(config).await.map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize: {}", e);
        e
    })?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            app.start().await.map_err(|e| {
                error!("Failed to start: {}", e);
                e
            })?;

            let exit_code = app.run().await.map_err(|e| {
                error!("System error during execution: {}", e);
                e
            })?;

            info!("Parkwatch exited with code: {}", exit_code);
            std::process::exit(exit_code);
        }
        Command::Snapshot {
            camera,
            out,
            wait_ms,
        } => {
            let result = snapshot(&app, &camera, Duration::from_millis(wait_ms)).await;
            app.shutdown().await?;

            let jpeg = result?;
            tokio::fs::write(&out, &jpeg)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Wrote {} bytes to {}", jpeg.len(), out.display());
        }
        Command::Status { camera, wait_ms } => {
            let status = if app.feeds().has_detector() {
                app.feeds()
                    .evaluate_once(&camera, Duration::from_millis(wait_ms))
                    .await
            } else {
                warn!("No detector configured; reporting stored zones only");
                Ok(app.feeds().status(&camera))
            };
            app.shutdown().await?;

            println!("{}", serde_json::to_string_pretty(&status?)?);
        }
    }

    Ok(())
}

/// Retry until the source yields a frame or `wait` elapses
async fn snapshot(app: &ParkwatchApp, camera: &str, wait: Duration) -> Result<bytes::Bytes> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match app.feeds().snapshot(camera).await {
            Ok(jpeg) => return Ok(jpeg),
            Err(e) if tokio::time::Instant::now() < deadline => {
                warn!("Snapshot from '{}' not ready: {}", camera, e);
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parkwatch={}", log_level)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };
    layers.push(fmt_layer);

    let guard = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "parkwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Parkwatch Configuration File");
    println!("# Default values for every option. Cameras are listed as [[cameras]] tables:");
    println!("#");
    println!("# [[cameras]]");
    println!("# id = \"north-lot\"");
    println!("# url = \"http://192.168.1.20/cgi-bin/snapshot.cgi\"");
    println!("# requires_auth = true");
    println!("# auth_mode = \"digest\"");
    println!("# user = \"admin\"");
    println!("# password = \"secret\"");
    println!();

    let rendered = toml::to_string_pretty(&ParkwatchConfig::default())
        .context("Failed to render default configuration")?;
    println!("{}", rendered);
    Ok(())
}
