mod app;
mod commands;

use anyhow::Context;
use clap::{Parser as ClapParser, ValueEnum};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use jockey_core::config::Config;
use jockey_core::controller::Controller;
use jockey_core::extract::Extractor;
use jockey_core::platform;
use jockey_core::player::MpvBackend;
use jockey_core::recover::RecoveryEngine;
use jockey_core::store::Library;

use app::{App, Flow, Prompt};
use commands::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, ClapParser)]
#[command(name = "jockey", about = "Text-controlled music playback agent")]
struct Args {
    /// Radio mode at startup (auto-continue when the queue empties).
    #[arg(long, value_enum, default_value = "on")]
    radio: Toggle,
    /// Override the voice front-end listen flag for this session only.
    #[arg(long, value_enum)]
    listen: Option<Toggle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(data_dir.join("jockey.log"))?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,jockey_core=info")),
        )
        .init();

    let cache_dir = platform::cache_dir();
    std::fs::create_dir_all(&cache_dir)?;
    platform::cleanup_temp_audio(&cache_dir);

    let mut config = Config::load();
    if let Some(listen) = args.listen {
        // Session-only override, deliberately not persisted.
        config.listen_enabled = listen == Toggle::On;
    }

    let library = Library::open(&data_dir);
    let extractor = Arc::new(Extractor::discover().context("extraction backend unavailable")?);
    let backend = MpvBackend::discover().context("audio output unavailable")?;
    let engine = RecoveryEngine::new(extractor.clone());

    let hotwords = config.hotwords.clone();
    let controller = Controller::new(
        backend,
        extractor.clone(),
        library,
        config,
        Config::config_path(),
        cache_dir,
        args.radio == Toggle::On,
    );

    // Position polling drives pre-fetch and track transitions.
    {
        let controller = controller.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_millis(500));
            loop {
                tick.tick().await;
                controller.update().await;
            }
        });
    }

    info!("jockey ready");
    println!("{}", app::HELP);
    println!();
    println!("{}", controller.status_line().await);

    let app = App::new(controller.clone(), engine, extractor);
    let parser = Parser::new();
    let mut pending: Option<Prompt> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt_marker();
    while let Some(line) = lines.next_line().await? {
        let mut line = line.trim().to_string();
        if line.is_empty() {
            prompt_marker();
            continue;
        }

        let flow = if let Some(p) = pending.take() {
            app.resolve(p, &line).await
        } else {
            // A leading hotword is tolerated so pasted voice transcripts
            // work unchanged.
            let low = line.to_lowercase();
            for hw in &hotwords {
                if low.starts_with(hw.as_str()) {
                    if let Some(rest) = line.get(hw.len()..) {
                        line = rest.trim().to_string();
                    }
                    break;
                }
            }
            match parser.parse(&line) {
                Some(cmd) => app.dispatch(cmd).await,
                None => Ok(Flow::Continue),
            }
        };

        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Ok(Flow::Ask(p)) => {
                println!("{}", p.question());
                pending = Some(p);
            }
            Err(e) => println!("error: {e}"),
        }
        prompt_marker();
    }

    controller.stop().await;
    println!("goodbye");
    Ok(())
}

fn prompt_marker() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}
