//! classifyd - live camera classification daemon
//!
//! This daemon:
//! 1. Captures frames from the configured device (stub://, image path, /dev/videoN)
//! 2. Admits one frame at a time to the selected classifier, dropping the rest
//! 3. Renders the top label after every inference (log lines or JSON lines)
//! 4. Accepts commands on stdin: `model <name>`, `models`, `preview on|off`,
//!    `status`, `quit`

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use live_classify::{
    BackendRegistry, CameraSource, ClassifydConfig, ClassifyError, DisplaySink, JsonSink,
    LogSink, ModelKind, Pipeline, PipelineHandle, Preprocessor, PreviewWriter, StubBackend,
};

const RENDER_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension). Defaults to $CLASSIFY_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Capture device: stub://name, an image path, or /dev/videoN.
    #[arg(long)]
    device: Option<String>,
    /// Initial model (googlenet-places, inceptionv3, resnet50, vgg16).
    #[arg(long)]
    model: Option<String>,
    /// Capture frame rate (0 = as fast as the device delivers).
    #[arg(long)]
    fps: Option<u32>,
    /// Crop strategy: exact or aspect-fill.
    #[arg(long)]
    strategy: Option<String>,
    /// Write each model input to this JPEG path.
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Emit one JSON object per display update on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
    /// Ignore stdin commands.
    #[arg(long, default_value_t = false)]
    no_commands: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Model(ModelKind),
    Models,
    Preview(bool),
    Status,
    Quit,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = load_config(&args)?;
    log::info!(
        "classifyd {} starting: device={} model={} strategy={}",
        env!("CARGO_PKG_VERSION"),
        cfg.capture.device,
        cfg.model,
        cfg.strategy
    );

    let registry = build_registry(&cfg)?;
    let backends = registry.list();

    let mut pipeline = Pipeline::new(registry, cfg.model)
        .with_preprocessor(Preprocessor::new(cfg.strategy));
    if let Some(path) = &cfg.preview.path {
        pipeline = pipeline.with_preview(PreviewWriter::new(path));
    }
    let (mut handle, events) = pipeline.start()?;
    handle.set_preview(cfg.preview.enabled);

    let mut sink: Box<dyn DisplaySink> = if args.json {
        Box::new(JsonSink::new(std::io::stdout()))
    } else {
        Box::new(LogSink)
    };
    sink.render(&handle.snapshot())?;

    let source = match open_camera(&cfg) {
        Ok(source) => source,
        Err(err) => {
            sink.render(&handle.report_error(&err))?;
            handle.stop()?;
            return Err(err.into());
        }
    };
    handle.spawn_capture(source, cfg.capture.target_fps)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("install Ctrl-C handler")?;
    }

    let commands = if args.no_commands {
        None
    } else {
        Some(spawn_command_reader()?)
    };
    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));

    while !shutdown.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        if let Some(commands) = &commands {
            while let Ok(command) = commands.try_recv() {
                if !run_command(command, &handle, sink.as_mut(), &backends)? {
                    shutdown.store(true, Ordering::SeqCst);
                }
            }
        }
        match events.recv_timeout(RENDER_POLL) {
            Ok(snapshot) => sink.render(&snapshot)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let counters = handle.snapshot().counters;
    log::info!(
        "shutting down: {} frames seen, {} admitted, {} dropped, {} classified, {} failed",
        counters.frames_seen,
        counters.frames_admitted,
        counters.frames_dropped,
        counters.inferences_completed,
        counters.inferences_failed
    );
    handle.stop()
}

/// File < environment < command line.
fn load_config(args: &Args) -> Result<ClassifydConfig> {
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var_os("CLASSIFY_CONFIG").map(PathBuf::from));
    let mut cfg = ClassifydConfig::load_from(config_path.as_deref())?;

    if let Some(device) = &args.device {
        cfg.capture.device = device.clone();
    }
    if let Some(model) = &args.model {
        cfg.model = model.parse()?;
    }
    if let Some(fps) = args.fps {
        cfg.capture.target_fps = fps;
    }
    if let Some(strategy) = &args.strategy {
        cfg.strategy = strategy.parse()?;
    }
    if let Some(path) = &args.preview {
        cfg.preview.path = Some(path.clone());
        cfg.preview.enabled = true;
    }
    Ok(cfg)
}

fn build_registry(cfg: &ClassifydConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.set_fallback(StubBackend::new());
    register_model_files(&mut registry, cfg)?;
    registry.warm_up()?;
    for (kind, backend) in registry.list() {
        log::info!("model {} served by {} backend", kind, backend);
    }
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_model_files(registry: &mut BackendRegistry, cfg: &ClassifydConfig) -> Result<()> {
    use live_classify::TractBackend;

    for (kind, files) in &cfg.model_files {
        let mut backend = TractBackend::new(&files.onnx_path, kind.profile())?;
        if let Some(labels) = &files.labels_path {
            backend = backend.with_labels_file(labels)?;
        }
        registry.register(*kind, backend);
    }
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_model_files(_registry: &mut BackendRegistry, cfg: &ClassifydConfig) -> Result<()> {
    if !cfg.model_files.is_empty() {
        log::warn!(
            "{} model file(s) configured but classifyd was built without backend-tract; using the stub backend",
            cfg.model_files.len()
        );
    }
    Ok(())
}

fn open_camera(cfg: &ClassifydConfig) -> Result<CameraSource, ClassifyError> {
    let mut source = CameraSource::new(cfg.capture.clone())?;
    source.connect()?;
    Ok(source)
}

fn spawn_command_reader() -> Result<Receiver<Command>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => log::warn!("{}", err),
                }
            }
        })?;
    Ok(rx)
}

fn parse_command(line: &str) -> Result<Option<Command>> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    let command = match (verb.to_ascii_lowercase().as_str(), arg) {
        ("model", Some(name)) => Command::Model(name.parse()?),
        ("model", None) => return Err(anyhow!("usage: model <name>")),
        ("models", _) => Command::Models,
        ("preview", Some("on")) => Command::Preview(true),
        ("preview", Some("off")) => Command::Preview(false),
        ("preview", _) => return Err(anyhow!("usage: preview on|off")),
        ("status", _) => Command::Status,
        ("quit" | "exit", _) => Command::Quit,
        (other, _) => return Err(anyhow!("unknown command '{}'", other)),
    };
    Ok(Some(command))
}

/// Returns false when the daemon should stop.
fn run_command(
    command: Command,
    handle: &PipelineHandle,
    sink: &mut dyn DisplaySink,
    backends: &[(ModelKind, String)],
) -> Result<bool> {
    match command {
        // The selection snapshot also arrives on the event channel.
        Command::Model(kind) => {
            handle.select_model(kind);
        }
        Command::Models => {
            let current = handle.current_model();
            for (kind, backend) in backends {
                let profile = kind.profile();
                log::info!(
                    "{} {} ({}x{}, {} backend)",
                    if *kind == current { "*" } else { " " },
                    kind.key(),
                    profile.input_width,
                    profile.input_height,
                    backend
                );
            }
        }
        Command::Preview(enabled) => {
            if enabled && !handle.has_preview_writer() {
                log::warn!("preview requested but no preview path is configured");
            }
            handle.set_preview(enabled);
        }
        Command::Status => sink.render(&handle.snapshot())?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("model resnet50").unwrap(),
            Some(Command::Model(ModelKind::Resnet50))
        );
        assert_eq!(parse_command("  MODELS ").unwrap(), Some(Command::Models));
        assert_eq!(
            parse_command("preview off").unwrap(),
            Some(Command::Preview(false))
        );
        assert_eq!(parse_command("status").unwrap(), Some(Command::Status));
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Quit));
        assert_eq!(parse_command("").unwrap(), None);
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse_command("model").is_err());
        assert!(parse_command("model alexnet").is_err());
        assert!(parse_command("preview maybe").is_err());
        assert!(parse_command("dance").is_err());
    }
}
