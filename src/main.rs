//! clipspeak - clipboard-to-speech with tiered fallback.
//!
//! A global hotkey captures the clipboard and hands the text to the
//! orchestrator, which walks remote synthesis endpoints (HTTP first,
//! then a raw TCP protocol) and escalates to local synthesis when the
//! network yields nothing. This is the entry point that wires config,
//! CLI flags, the hotkey listener, and the main event loop together.

mod clipboard;
mod config;
mod diagnostics;
mod hotkey;
mod net;
mod orchestrator;
mod tts;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use diagnostics::DiagnosticsReporter;
use hotkey::{HotkeyConfig, HotkeyEvent, HotkeyListener};
use net::http::HttpDispatcher;
use net::raw::RawDispatcher;
use net::{candidates, probe, RemoteDispatch, TransportKind};
use orchestrator::{Orchestrator, OrchestratorSettings, SynthesisRequest};
use tts::adapter::BackendAdapter;

#[derive(Parser, Debug)]
#[command(name = "clipspeak", about = "Speak clipboard text via a fallback chain of synthesis backends")]
struct Cli {
    /// Port of the synthesis service.
    #[arg(long)]
    port: Option<u16>,

    /// Speak trigger combo, e.g. "ctrl+alt+p".
    #[arg(long)]
    hotkey: Option<String>,

    /// Force a specific model name on every tier.
    #[arg(long)]
    model: Option<String>,

    /// Language tag, e.g. "en" or "zh-cn". Default: detect from text.
    #[arg(long)]
    language: Option<String>,

    /// Synthesize this text once and exit instead of listening for the
    /// hotkey.
    #[arg(long)]
    text: Option<String>,

    /// Write the audio artifact here instead of a temp file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip playback, just produce the audio file.
    #[arg(long)]
    no_play: bool,

    /// Probe every candidate endpoint and report reachability, then
    /// exit.
    #[arg(long)]
    diagnose: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing (respects RUST_LOG env, defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::read_config();
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(ref hotkey) = cli.hotkey {
        cfg.hotkey = hotkey.clone();
    }
    if cli.model.is_some() {
        cfg.model = cli.model.clone();
    }
    if cli.language.is_some() {
        cfg.language = cli.language.clone();
    }
    info!(port = cfg.port, hotkey = %cfg.hotkey, "Configuration loaded");

    if cli.diagnose {
        run_diagnose(&cfg).await;
        return;
    }

    let settings = OrchestratorSettings {
        probe_timeout: Duration::from_millis(cfg.probe_timeout_ms),
        retry_delay: Duration::from_millis(500),
        remote_budget: Duration::from_millis(cfg.remote_budget_ms),
    };
    let dispatch_timeout = Duration::from_millis(cfg.dispatch_timeout_ms);
    let tiers: Vec<Box<dyn RemoteDispatch>> = vec![
        Box::new(HttpDispatcher::new(settings.probe_timeout, dispatch_timeout)),
        Box::new(RawDispatcher::new(dispatch_timeout)),
    ];
    let adapter = BackendAdapter::with_default_backends(&cfg.model_dir());
    let orchestrator = Orchestrator::new(
        cfg.port,
        tiers,
        adapter,
        settings,
        Arc::new(DiagnosticsReporter::new()),
    );

    if let Some(ref text) = cli.text {
        let request = build_request(text.clone(), &cfg, cli.output.clone());
        match orchestrator.handle(&request).await {
            Ok(done) => {
                info!(path = %done.audio_path.display(), via = %done.produced_by, "Synthesis complete");
                if !cli.no_play {
                    play(done.audio_path, cfg.volume).await;
                }
            }
            Err(e) => {
                error!("{e:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    run_hotkey_loop(&orchestrator, &cfg, &cli).await;
    info!("clipspeak shutting down");
}

/// Main interactive loop: wait for the speak combo, read the clipboard,
/// synthesize, play.
async fn run_hotkey_loop(orchestrator: &Orchestrator, cfg: &config::AppConfig, cli: &Cli) {
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let listener = HotkeyListener::new(HotkeyConfig {
        speak_combo: cfg.hotkey.clone(),
    });
    listener.start(tx);

    info!(combo = %cfg.hotkey, "Ready. Press the combo to speak the clipboard, Escape to quit");

    while let Some(event) = rx.recv().await {
        match event {
            HotkeyEvent::Quit => {
                info!("Escape pressed, exiting");
                break;
            }
            HotkeyEvent::Speak => {
                let Some(text) = clipboard::read_text() else {
                    warn!("Nothing to speak on the clipboard");
                    continue;
                };
                info!(chars = text.chars().count(), "Clipboard captured");

                let request = build_request(text, cfg, None);
                match orchestrator.handle(&request).await {
                    Ok(done) => {
                        info!(via = %done.produced_by, "Synthesis complete");
                        if !cli.no_play {
                            play(done.audio_path, cfg.volume).await;
                        }
                    }
                    Err(e) => error!("{e:#}"),
                }

                // Speak presses during a long synthesis are stale by
                // now; a queued Escape is still honored.
                if drain_stale(&mut rx) {
                    info!("Escape pressed during synthesis, exiting");
                    break;
                }
            }
        }
    }

    listener.stop();
}

/// Discard Speak events queued while a request was in flight. Returns
/// true when a Quit was among them.
fn drain_stale(rx: &mut tokio::sync::mpsc::Receiver<HotkeyEvent>) -> bool {
    let mut quit = false;
    while let Ok(event) = rx.try_recv() {
        if event == HotkeyEvent::Quit {
            quit = true;
        }
    }
    quit
}

fn build_request(text: String, cfg: &config::AppConfig, output: Option<PathBuf>) -> SynthesisRequest {
    SynthesisRequest {
        text,
        language: cfg.language.clone(),
        output_path: output,
        model_override: cfg.model.clone(),
    }
}

async fn play(path: PathBuf, volume: f32) {
    let result =
        tokio::task::spawn_blocking(move || tts::playback::play_file(&path, volume)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Playback failed: {e:#}"),
        Err(e) => warn!("Playback task panicked: {e}"),
    }
}

/// Probe every candidate endpoint and print a reachability report.
async fn run_diagnose(cfg: &config::AppConfig) {
    let probe_timeout = Duration::from_millis(cfg.probe_timeout_ms);
    let http = HttpDispatcher::new(probe_timeout, probe_timeout);

    println!("clipspeak connection diagnosis (port {})", cfg.port);
    println!();

    for candidate in candidates::generate(cfg.port, TransportKind::Http) {
        let authority = candidate.authority();
        match probe::probe(&candidate, probe_timeout).await {
            probe::ProbeResult::Reachable => {
                let base_url = candidate.base_url();
                let health = match http.check_health(&base_url).await {
                    Ok(()) => "service healthy".to_string(),
                    Err(e) => format!("reachable but unhealthy: {e}"),
                };
                println!("  {authority:<28} OPEN     {health}");
                if let Ok(models) = http.list_models(&base_url).await {
                    for model in models {
                        println!("  {:<28}          loaded: {model}", "");
                    }
                }
            }
            probe::ProbeResult::Refused => {
                println!("  {authority:<28} REFUSED  nothing listening");
            }
            probe::ProbeResult::TimedOut => {
                println!("  {authority:<28} TIMEOUT  filtered or unreachable");
            }
            probe::ProbeResult::Unreachable => {
                println!("  {authority:<28} ERROR    host did not resolve or route");
            }
        }
    }

    println!();
    println!("If every candidate is closed, start the synthesis service or");
    println!("check VPN/firewall rules; clipspeak will fall back to local");
    println!("synthesis either way.");
}
