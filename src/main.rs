//! crowd-cast OBS host
//!
//! Reads one JSON request per line on stdin and writes one JSON response per
//! line on stdout. Lifecycle calls settle in the background, so responses may
//! arrive out of order; match them by `id`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crowd_cast_obsapi::api::{invoke, HostReply, HostRequest, HostResponse};
use crowd_cast_obsapi::engine::{Engine, SimulatedEngine};
use crowd_cast_obsapi::{logging, Config, ObsApi};

struct Args {
    simulate: bool,
    config_path: Option<PathBuf>,
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        print_help();
        return Ok(());
    };

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let _log_guard = logging::init_logging(&config.logging)?;
    info!("crowd-cast OBS host starting...");
    info!("Configuration loaded from {:?}", config.config_path().ok());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.jobs.max_blocking_threads.max(1))
        .build()
        .context("Failed to build tokio runtime")?;

    let engine = create_engine(args.simulate);
    let api = Arc::new(ObsApi::new(engine, &config, runtime.handle().clone()));

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = shutdown_tx.send(());
    })?;

    runtime.block_on(serve(api.clone(), shutdown_rx));

    if api.is_initialized() {
        info!("{}", api.shutdown());
    }

    // stdin is read on a blocking thread that may never return
    runtime.shutdown_timeout(Duration::from_secs(1));

    info!("Shutdown complete");
    Ok(())
}

/// Answer requests until stdin closes or a shutdown is signalled, then wait for
/// every pending job to settle
async fn serve(api: Arc<ObsApi>, mut shutdown_rx: mpsc::UnboundedReceiver<()>) {
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<HostResponse>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = reply_rx.recv().await {
            let mut line = match serde_json::to_string(&response) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!("Failed to write response: {}", e);
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                handle_line(&api, &line, &reply_tx, &mut pending);
            }
        }
    }

    while pending.join_next().await.is_some() {}

    drop(reply_tx);
    let _ = writer.await;
}

fn handle_line(
    api: &ObsApi,
    line: &str,
    reply_tx: &mpsc::UnboundedSender<HostResponse>,
    pending: &mut JoinSet<()>,
) {
    let request: HostRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed request: {}", e);
            let _ = reply_tx.send(HostResponse {
                id: serde_json::Value::Null,
                result: None,
                error: Some(format!("Malformed request: {}", e)),
            });
            return;
        }
    };

    debug!("Request {}: {} {:?}", request.id, request.call, request.args);

    match invoke(api, &request.call, &request.args) {
        Ok(HostReply::Ready(value)) => {
            let _ = reply_tx.send(HostResponse::from_outcome(request.id, Ok(value)));
        }
        Ok(HostReply::Pending(job)) => {
            let reply_tx = reply_tx.clone();
            let id = request.id;
            pending.spawn(async move {
                let outcome = job.await;
                let _ = reply_tx.send(HostResponse::from_outcome(id, outcome));
            });
        }
        Err(e) => {
            let _ = reply_tx.send(HostResponse::from_outcome(request.id, Err(e)));
        }
    }
}

#[cfg(feature = "libobs")]
fn create_engine(simulate: bool) -> Arc<dyn Engine> {
    if simulate {
        info!("Using simulated engine");
        Arc::new(SimulatedEngine::new())
    } else {
        info!("Using libobs engine");
        Arc::new(crowd_cast_obsapi::engine::LibObsEngine::new())
    }
}

#[cfg(not(feature = "libobs"))]
fn create_engine(simulate: bool) -> Arc<dyn Engine> {
    if !simulate {
        warn!("Built without the libobs feature, falling back to the simulated engine");
    }
    Arc::new(SimulatedEngine::new())
}

/// Returns `None` when help was requested
fn parse_args() -> Result<Option<Args>> {
    let mut args = Args {
        simulate: false,
        config_path: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--simulate" => args.simulate = true,
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(Some(args))
}

fn print_help() {
    println!("crowd-cast OBS host - line-oriented control of an embedded libobs");
    println!();
    println!("USAGE:");
    println!("    crowd-cast-obsapi [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help         Print this help message");
    println!("        --simulate     Use the simulated engine instead of libobs");
    println!("        --config PATH  Load configuration from PATH");
    println!();
    println!("PROTOCOL:");
    println!("    stdin:  {{\"id\": 1, \"call\": \"resetVideo\", \"args\": [\"1280x720\"]}}");
    println!("    stdout: {{\"id\": 1, \"result\": \"1280x720\"}} or {{\"id\": 1, \"error\": \"...\"}}");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                     Set log level (e.g., debug, info, warn)");
    println!("    CROWD_CAST_OBSAPI_LOG_PATH   Override the log directory");
}
