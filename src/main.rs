// halftime - guided track review from the terminal
// Loads identifiers, drives playback through the notes backend, exports notes as CSV

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use halftime::{Config, IdentifierParser, PlaybackGateway};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "halftime")]
#[command(about = "Play each track from its midpoint, jot a note, export the lot")]
struct Args {
    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable developer logging (stderr + debug output)
    #[arg(long, global = true)]
    dev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Review every track in a file
    Review {
        /// CSV or plain-text list of track identifiers
        file: PathBuf,

        /// Seconds per track before playback pauses
        #[arg(long)]
        window: Option<u32>,

        /// Directory for exported notes
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the identifiers a file would load, one per line
    Parse { file: PathBuf },
    /// Check whether the backend session is logged in
    Status,
    /// Open the backend login page in a browser
    Login,
}

fn init_logging(log_dir: &Path, stderr: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(log_dir, "halftime.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Base filter: info level for general logs, debug for halftime
    let base_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,halftime=debug"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // The review screen owns the terminal, so stderr only outside it
    let stderr_layer = stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load config - writes defaults on first run
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let reviewing = matches!(args.command, Command::Review { .. });
    let _guard = init_logging(&config.log_directory, args.dev && !reviewing)?;
    info!("halftime starting up");

    match args.command {
        Command::Review { file, window, out } => review(config, &file, window, out).await,
        Command::Parse { file } => {
            let tracks = IdentifierParser::new().parse_file(&file)?;
            if tracks.is_empty() {
                bail!("No track identifiers found in {}", file.display());
            }
            for track in &tracks {
                println!("{}", track);
            }
            Ok(())
        }
        Command::Status => {
            let gateway = halftime::HttpGateway::new(&config.gateway, config.session.fallback_duration_ms)?;
            let auth = gateway.fetch_status().await;
            if auth.authenticated {
                println!("Logged in");
            } else {
                println!("Not logged in. Run `halftime login`.");
            }
            Ok(())
        }
        Command::Login => {
            let url = config.gateway.login_url();
            println!("Opening {}", url);
            println!("Once logged in, copy the session cookie into the config's [gateway] session_cookie.");
            open::that(&url).with_context(|| format!("Failed to open {}", url))?;
            Ok(())
        }
    }
}

#[cfg(feature = "tui")]
async fn review(mut config: Config, file: &Path, window: Option<u32>, out: Option<PathBuf>) -> Result<()> {
    use halftime::{
        DeviceManager, ExportManager, ExportPrompt, HttpGateway, SessionController, WebApiDeviceBackend,
    };
    use halftime::ui::ReviewApp;
    use std::sync::Arc;

    let tracks = IdentifierParser::new().parse_file(file)?;
    if tracks.is_empty() {
        bail!("No track identifiers found in {}", file.display());
    }

    if let Some(window) = window {
        config.session.window_seconds = window;
    }
    if let Some(out) = out {
        config.export.directory = out;
    }

    let gateway = Arc::new(HttpGateway::new(&config.gateway, config.session.fallback_duration_ms)?);
    let backend = Arc::new(WebApiDeviceBackend::new(&config.device)?);

    let devices = DeviceManager::new();
    let (mut controller, ticks) =
        SessionController::new(gateway.clone(), devices.subscribe(), config.session.window_seconds);
    controller.load(tracks)?;

    let mut app = ReviewApp::new(
        gateway,
        backend,
        (controller, ticks),
        devices,
        ExportPrompt::new(ExportManager::from_config(&config.export)),
        config.session.window_seconds,
    )?;
    app.run().await
}

#[cfg(not(feature = "tui"))]
async fn review(_config: Config, _file: &Path, _window: Option<u32>, _out: Option<PathBuf>) -> Result<()> {
    bail!("halftime was built without the `tui` feature; rebuild with it to review")
}
