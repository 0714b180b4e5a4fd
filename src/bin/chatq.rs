//! chatq CLI: runs the queue over the console transport.

use std::path::PathBuf;
use std::sync::Arc;

use chatq::config::secrets::ExposeSecret;
use chatq::config::{Config, SpeechBackend};
use chatq::console::run_console;
use chatq::engine::{Fulfillment, QueueWorker};
use chatq::event::EventBus;
use chatq::llm;
use chatq::queue::WorkQueue;
use chatq::synthesis::{MediaPipeline, VideoConfig};
use chatq::telemetry::{TelemetryConfig, init_telemetry};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chatq", about = "Fair work queue for chat-triggered replies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read `name: message` lines from stdin and reply on stdout
    Serve {
        /// Directory where audio/video attachments are saved
        #[arg(long, default_value = "outbox")]
        outbox: PathBuf,
        /// Append every queue event as a JSON line to this file
        #[arg(long)]
        events: Option<PathBuf>,
    },
    /// Validate configuration and the media toolchain, then exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { outbox, events } => cmd_serve(outbox, events).await,
        Command::Check => cmd_check(),
    }
}

async fn cmd_serve(outbox: PathBuf, events_log: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "chatq".to_string(),
        log_level: config.log_level.clone(),
        log_format: config.log_format,
    })?;

    let generator = llm::generator(
        config.generation.provider,
        &config.generation.api_key,
        &config.generation.model,
    )?;
    let media = MediaPipeline::from_config(&config)?;

    let events = EventBus::default();
    if let Some(path) = events_log {
        spawn_event_log(&events, path).await?;
    }

    let (queue, receiver) = WorkQueue::new(config.queue_capacity, events.clone());
    let fulfillment = Fulfillment::new(generator, media, config.timeouts, events.clone());
    let worker = QueueWorker::new(receiver, fulfillment, events);

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.trigger();
    });

    info!(
        provider = %config.generation.provider,
        model = %config.generation.model,
        capacity = config.queue_capacity.get(),
        "chatq serving on the console"
    );

    let output = Arc::new(tokio::sync::Mutex::new(tokio::io::stdout()));
    tokio::spawn(async move {
        let input = BufReader::new(tokio::io::stdin());
        if let Err(e) = run_console(input, output, queue, outbox).await {
            error!(error = %e, "console transport stopped");
        }
    });

    worker.run().await;
    Ok(())
}

/// Mirror the event stream into a JSON-lines file.
async fn spawn_event_log(events: &EventBus, path: PathBuf) -> anyhow::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let mut rx = events.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(mut line) = serde_json::to_string(&event) else {
                        continue;
                    };
                    line.push('\n');
                    if let Err(e) = file.write_all(line.as_bytes()).await {
                        warn!(error = %e, "event log write failed");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Ok(())
}

fn cmd_check() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    println!("Chat token:    {}", redact(config.chat_token.expose_secret()));
    println!("Provider:      {}", config.generation.provider);
    println!("Model:         {}", config.generation.model);
    println!("API key:       {}", redact(config.generation.api_key.expose_secret()));
    println!("Capacity:      {}", config.queue_capacity);
    println!("Log level:     {}", config.log_level);
    println!(
        "Speech:        {}",
        match &config.speech {
            SpeechBackend::None => "disabled".to_string(),
            SpeechBackend::Translate { lang } => format!("translate ({lang})"),
            SpeechBackend::Command { program } => format!("command ({})", program.display()),
        }
    );
    println!(
        "Timeouts:      generation {:?}, speech {:?}, video {:?}, delivery {:?}",
        config.timeouts.generation,
        config.timeouts.speech,
        config.timeouts.video,
        config.timeouts.delivery
    );

    match &config.video_config {
        None => println!("Video:         disabled"),
        Some(path) => {
            let video = VideoConfig::load(path)?;
            match video.unavailable_reason() {
                None => println!("Video:         {} (ready)", video.program.display()),
                Some(reason) if video.required => anyhow::bail!("video required but {reason}"),
                Some(reason) => println!("Video:         unavailable ({reason}), audio fallback"),
            }
        }
    }

    // Runs the same startup checks `serve` does.
    MediaPipeline::from_config(&config)?;
    println!("OK");
    Ok(())
}

fn redact(secret: &str) -> String {
    let len = secret.chars().count();
    if len < 12 {
        return format!("**** ({len} chars)");
    }
    let shown: String = secret.chars().take(4).collect();
    format!("{shown}… ({len} chars)")
}
