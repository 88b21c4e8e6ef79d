// Offline output to a 16-bit PCM WAV file
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{WavSpec, WavWriter};
use tracing::info;

use crate::audio::output::{OutputSink, RegionGuard, SampleFormat, SinkFormat};
use crate::error::{Error, Result};

/// Sink that writes every released frame to a stereo WAV file.
///
/// It never fills up, so the playback loop runs through the source as fast as
/// it can render.
pub struct WavSink {
    path: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    format: SinkFormat,
    scratch: Vec<f32>,
    region: RegionGuard,
    started: bool,
    frames_written: u64,
}

impl WavSink {
    pub fn create(path: &Path, sample_rate: u32, buffer_frames: usize) -> Result<Self> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(|e| {
            Error::DeviceInit(format!("Failed to create {}: {}", path.display(), e))
        })?;

        let buffer_frames = buffer_frames.max(1);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            format: SinkFormat {
                sample_rate,
                channels: 2,
                sample_format: SampleFormat::I16,
                buffer_frames,
            },
            scratch: vec![0.0; buffer_frames * 2],
            region: RegionGuard::default(),
            started: false,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn writer(&mut self) -> Result<&mut WavWriter<BufWriter<File>>> {
        if !self.started {
            return Err(Error::DeviceIo("WAV sink is not started".to_string()));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| Error::DeviceIo("WAV sink is already stopped".to_string()))
    }
}

impl OutputSink for WavSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn start(&mut self) -> Result<()> {
        if self.writer.is_none() {
            return Err(Error::DeviceIo("WAV sink is already stopped".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| Error::DeviceIo("WAV sink is already stopped".to_string()))?;
        writer
            .finalize()
            .map_err(|e| Error::DeviceIo(format!("Failed to finalize {}: {}", self.path.display(), e)))?;
        info!(path = ?self.path, frames = self.frames_written, "Wrote WAV file");
        Ok(())
    }

    fn current_free_frames(&mut self) -> Result<usize> {
        self.writer()?;
        Ok(self.format.buffer_frames)
    }

    fn acquire_write_region(&mut self, frames: usize) -> Result<&mut [f32]> {
        self.writer()?;
        self.region.acquire(frames, self.format.buffer_frames)?;
        let len = frames * 2;
        self.scratch.resize(len.max(self.scratch.len()), 0.0);
        Ok(&mut self.scratch[..len])
    }

    fn release_write_region(&mut self, frames: usize, _silent: bool) -> Result<()> {
        // Trailing padding is not written: the file ends with the last rendered frame
        self.region.release(frames)?;
        let len = frames * 2;
        let samples: Vec<i16> = self.scratch[..len].iter().map(|&s| to_i16(s)).collect();

        let path = self.path.clone();
        let writer = self.writer()?;
        for sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::DeviceIo(format!("Failed to write {}: {}", path.display(), e)))?;
        }
        self.frames_written += frames as u64;
        Ok(())
    }

    fn is_realtime(&self) -> bool {
        false
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_i16_inverts_normalization() {
        assert_eq!(to_i16(0.0), 0);
        assert_eq!(to_i16(8000.0 / 32768.0), 8000);
        assert_eq!(to_i16(-0.5), -16384);
        assert_eq!(to_i16(2.0), i16::MAX);
        assert_eq!(to_i16(-2.0), i16::MIN);
    }

    #[test]
    fn test_writes_require_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::create(&dir.path().join("out.wav"), 44_100, 64).unwrap();
        assert!(sink.acquire_write_region(8).is_err());
        sink.start().unwrap();
        assert_eq!(sink.current_free_frames().unwrap(), 64);
        sink.acquire_write_region(8).unwrap().fill(0.25);
        sink.release_write_region(8, false).unwrap();
        assert_eq!(sink.frames_written(), 8);
        sink.stop().unwrap();
        assert!(sink.stop().is_err());
    }
}
