// Binaural Player - real-time binaural rendering of a mono source
// Module declarations
pub mod audio;
pub mod error;
pub mod settings;
pub mod spatial;

use std::path::Path;

use audio::{decode, CpalSink, PlaybackStats, Player, WavSink};
use settings::PlaybackSettings;
use spatial::BinauralRenderer;

pub use error::{Error, Result};

/// Decode `source`, mix it to mono and set up a renderer starting at `azimuth` radians
pub fn load_renderer(
    source: &Path,
    azimuth: f32,
    settings: &PlaybackSettings,
) -> Result<BinauralRenderer> {
    let audio = decode(source)?;
    let sample_rate = audio.sample_rate;
    BinauralRenderer::new(
        audio.into_mono(),
        sample_rate,
        azimuth,
        settings.render_params(),
    )
}

/// Stream `source` to an output device until it has played out
pub fn play_file(source: &Path, azimuth: f32, settings: &PlaybackSettings) -> Result<PlaybackStats> {
    let renderer = load_renderer(source, azimuth, settings)?;
    let sink = CpalSink::open(
        settings.device.as_deref(),
        renderer.sample_rate(),
        settings.buffer_duration(),
    )?;
    Player::new(renderer, sink).play()
}

/// Render `source` into a stereo WAV file at `output`
pub fn render_file(
    source: &Path,
    output: &Path,
    azimuth: f32,
    settings: &PlaybackSettings,
) -> Result<PlaybackStats> {
    let renderer = load_renderer(source, azimuth, settings)?;
    let sample_rate = renderer.sample_rate();
    let buffer_frames =
        (settings.buffer_duration().as_secs_f64() * sample_rate as f64).round() as usize;
    let sink = WavSink::create(output, sample_rate, buffer_frames)?;
    Player::new(renderer, sink).play()
}
