//! Command-line front end for the binaural player.
//!
//! ```bash
//! binaural-player play flamenco.wav --azimuth 90
//! binaural-player render flamenco.wav -o flamenco-binaural.wav
//! binaural-player devices
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use binaural_player_lib::audio::list_devices;
use binaural_player_lib::settings::PlaybackSettings;
use binaural_player_lib::{play_file, render_file};

#[derive(Parser)]
#[command(
    name = "binaural-player",
    about = "Sweeps a mono source around the listener's head over headphones",
    version
)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a file through an audio output device.
    Play(SourceArgs),

    /// Render a file to a stereo WAV file instead of playing it.
    Render {
        #[command(flatten)]
        source: SourceArgs,

        /// Output WAV file path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the available output devices.
    Devices,
}

#[derive(Args)]
struct SourceArgs {
    /// Audio file to play (anything Symphonia decodes).
    input: PathBuf,

    /// Starting azimuth in degrees: 0 ahead, 90 at the right ear.
    #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
    azimuth: f32,

    /// JSON settings file. Missing files fall back to defaults.
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

impl SourceArgs {
    fn load_settings(&self) -> Result<PlaybackSettings> {
        match &self.settings {
            Some(path) => PlaybackSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display())),
            None => Ok(PlaybackSettings::default()),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play(args) => cmd_play(&args),
        Commands::Render { source, output } => cmd_render(&source, &output),
        Commands::Devices => cmd_devices(),
    }
}

fn cmd_play(args: &SourceArgs) -> Result<()> {
    let settings = args.load_settings()?;
    let stats = play_file(&args.input, args.azimuth.to_radians(), &settings)
        .with_context(|| format!("playing {}", args.input.display()))?;
    info!(
        frames = stats.frames_rendered,
        chunks = stats.chunks_written,
        "Playback finished"
    );
    Ok(())
}

fn cmd_render(args: &SourceArgs, output: &Path) -> Result<()> {
    let settings = args.load_settings()?;
    let stats = render_file(&args.input, output, args.azimuth.to_radians(), &settings)
        .with_context(|| format!("rendering {} to {}", args.input.display(), output.display()))?;
    info!(
        frames = stats.frames_rendered,
        output = %output.display(),
        "Render finished"
    );
    Ok(())
}

fn cmd_devices() -> Result<()> {
    let devices = list_devices().context("listing output devices")?;
    if devices.is_empty() {
        println!("No output devices found.");
    }
    for name in devices {
        println!("{}", name);
    }
    Ok(())
}
