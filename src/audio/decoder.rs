// Audio decoder using Symphonia
// Decodes audio files to interleaved 16-bit PCM and mixes them down to mono

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::spatial::renderer::DEFAULT_SAMPLE_RATE;

pub struct AudioDecoder {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_ms: Option<i64>,
    sample_buf: Option<SampleBuffer<i16>>,
}

impl AudioDecoder {
    /// Open an audio file and prepare for decoding
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::source_load(path, e))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint using the file extension
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::source_load(path, format!("unrecognized format: {}", e)))?;

        let format = probed.format;

        // First decodable audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::source_load(path, "no audio track found"))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let duration_ms = track
            .codec_params
            .n_frames
            .map(|frames| (frames as f64 / sample_rate as f64 * 1000.0) as i64);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::source_load(path, format!("unsupported codec: {}", e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_ms,
            sample_buf: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Duration in milliseconds, if the container reports it
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    /// Decode the next packet into interleaved i16 samples.
    /// Returns None at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<&[i16]>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(Error::source_load(&self.path, format!("read failed: {}", e)))
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    self.channels = spec.channels.count();

                    // Reuse the sample buffer unless this packet outgrows it
                    let frames = decoded.capacity();
                    if self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |b| b.capacity() < frames * self.channels)
                    {
                        self.sample_buf = None;
                    }
                    let buf = self
                        .sample_buf
                        .get_or_insert_with(|| SampleBuffer::new(frames as u64, spec));
                    buf.copy_interleaved_ref(decoded);
                    return Ok(Some(buf.samples()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(path = ?self.path, "Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => {
                    return Err(Error::source_load(&self.path, format!("decode failed: {}", e)))
                }
            }
        }
    }
}

/// A fully decoded source
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples, `channels` per frame
    pub samples: Vec<i16>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Total number of samples across all channels
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    /// Average every frame's channels into one sample
    pub fn into_mono(self) -> Vec<i16> {
        mono_mix(&self.samples, self.channels)
    }
}

/// Decode a whole file into memory
pub fn decode(path: &Path) -> Result<DecodedAudio> {
    let mut decoder = AudioDecoder::open(path)?;
    let mut samples = Vec::new();
    while let Some(packet) = decoder.decode_next()? {
        samples.extend_from_slice(packet);
    }

    let audio = DecodedAudio {
        samples,
        channels: decoder.channels(),
        sample_rate: decoder.sample_rate(),
    };
    info!(
        path = ?path,
        channels = audio.channels,
        sample_rate = audio.sample_rate,
        frames = audio.frame_count(),
        duration_ms = ?decoder.duration_ms(),
        "Decoded source"
    );
    Ok(audio)
}

/// Mix interleaved samples down to mono.
///
/// Each output sample is the integer average of one frame, truncated toward zero.
/// A trailing partial frame is dropped.
pub fn mono_mix(samples: &[i16], channels: usize) -> Vec<i16> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / n as i32) as i16
            })
            .collect(),
    }
}
