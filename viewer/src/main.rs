mod app;
mod dispatcher;
mod identity;
mod socket;
mod transport;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use graph::window::Viewport;
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::{App, Console, FrameLoop, Snapshot};
use crate::dispatcher::Dispatcher;
use crate::identity::FileStore;
use crate::socket::Transport;
use crate::transport::{Negotiation, TransportError, TransportOptions};

#[derive(Debug, thiserror::Error)]
enum ViewerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no ping reply within {0} ms")]
    Timeout(u64),
    #[error("failed waiting for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "sensorstream-viewer", about = "Watch a sensorstream relay and render its readings")]
struct Cli {
    #[arg(long, env = "SENSORSTREAM_URL", default_value = "ws://127.0.0.1:8080/api/ws")]
    url: String,

    /// File holding this viewer's durable id. Created on first run.
    #[arg(long, env = "SENSORSTREAM_ID_FILE", default_value = ".sensorstream/viewer-id")]
    id_file: PathBuf,

    /// Speak JSON text frames from the start instead of protobuf.
    #[arg(long)]
    text: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream readings and animate the graph.
    Watch(WatchArgs),
    /// Measure round-trip latency to the relay.
    Ping {
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Write the current frame as SVG to this path.
    #[arg(long)]
    svg_out: Option<PathBuf>,

    /// Frames between SVG snapshots.
    #[arg(long, default_value_t = 60)]
    svg_every: u64,

    #[arg(long, default_value_t = graph::consts::VIEWPORT_WIDTH)]
    width: f64,

    #[arg(long, default_value_t = graph::consts::VIEWPORT_HEIGHT)]
    height: f64,

    /// Keep console lines out of stdout.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ViewerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    LocalSet::new().run_until(run(cli)).await
}

async fn run(cli: Cli) -> Result<(), ViewerError> {
    let mut options = TransportOptions::new(cli.url);
    if cli.text {
        options.negotiation = Negotiation::Text;
    }
    let store = FileStore::new(cli.id_file);

    match cli.command {
        Command::Watch(args) => run_watch(options, &store, args).await,
        Command::Ping { timeout_ms } => run_ping(options, &store, timeout_ms).await,
    }
}

async fn run_watch(options: TransportOptions, store: &FileStore, args: WatchArgs) -> Result<(), ViewerError> {
    let dispatcher = Dispatcher::new();
    let app = App::attach(&dispatcher, Viewport::new(args.width, args.height), Console::new(!args.quiet));
    let transport = Transport::start(options, store, dispatcher)?;
    info!(viewer = %transport.viewer_id(), "viewer: watching");

    let snapshot = args.svg_out.map(|path| Snapshot::new(path, args.svg_every));
    let frames = FrameLoop::new(app.window(), graph::svg::SvgSurface::new());
    let render = frames.run(move |svg, frame| {
        if let Some(snapshot) = &snapshot {
            snapshot.maybe_write(svg, frame);
        }
    });

    tokio::select! {
        () = render => {}
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("viewer: shutting down");
    app.detach();
    drop(transport);
    Ok(())
}

async fn run_ping(options: TransportOptions, store: &FileStore, timeout_ms: u64) -> Result<(), ViewerError> {
    let transport = Transport::start(options, store, Dispatcher::new())?;
    let latency = tokio::time::timeout(Duration::from_millis(timeout_ms), transport.measure_latency())
        .await
        .map_err(|_| ViewerError::Timeout(timeout_ms))??;
    println!("{} ms", latency.as_millis());
    Ok(())
}
