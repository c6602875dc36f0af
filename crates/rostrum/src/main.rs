use std::path::PathBuf;

use clap::Parser;
use rostrum_core::{ConfigManager, ConsoleCommand, CueConsole};

/// Cueing console for multi-bus media playback in live performances.
#[derive(Parser, Debug)]
#[command(name = "rostrum")]
#[command(about = "Rostrum cueing console")]
struct Args {
    /// Show folder to load at startup (contains the cue file and media
    /// registry)
    #[arg(short, long)]
    show: Option<PathBuf>,

    /// Path to the settings file
    #[arg(long, default_value = "settings.json")]
    config: PathBuf,

    /// Whether to enable MIDI control surface support
    #[arg(short, long)]
    enable_midi: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ConfigManager::new(Some(args.config));
    let mut settings = config.load()?;
    if args.enable_midi {
        settings.midi_enabled = true;
        config.update_settings(settings.clone())?;
    }

    println!("Configuring Rostrum:");
    println!("Listen port: {}", settings.listen_port);
    println!(
        "Remote: {}:{}",
        settings.remote_host, settings.remote_port
    );
    if settings.midi_enabled {
        println!("MIDI device: {}", settings.midi_device);
    }

    let mut console = CueConsole::new(config);
    console.initialize().await?;

    if let Some(show) = args.show {
        console
            .handle_command(ConsoleCommand::LoadShow { path: show })
            .await;
    }

    let commands = console.commands();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        let _ = commands.send(ConsoleCommand::Shutdown).await;
    });

    console.run().await?;
    log::info!("Console shut down cleanly");
    Ok(())
}
