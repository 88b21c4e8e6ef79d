// Audio module
// Uses Symphonia for decoding and cpal (or a WAV file) for output

pub mod decoder;
pub mod output;
pub mod player;
pub mod wav;

pub use decoder::{decode, mono_mix, AudioDecoder, DecodedAudio};
pub use output::{list_devices, CpalSink, OutputSink, SampleFormat, SinkFormat};
pub use player::{PlaybackStats, Player, PlayerState};
pub use wav::WavSink;
