// Settings module
// JSON-backed playback settings

#[allow(clippy::module_inception)]
pub mod settings;

pub use settings::PlaybackSettings;
