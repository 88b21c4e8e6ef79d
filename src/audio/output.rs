// Audio output
// The sink interface driven by the playback loop, and its cpal implementation
// feeding the device through a ring buffer

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig, SupportedStreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use tracing::{error, info, warn};

use crate::error::{Error, Result};

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Sample type the device consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    I16,
    U16,
}

/// Format negotiated with a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    /// Size of the sink's queue in frames
    pub buffer_frames: usize,
}

impl SinkFormat {
    /// Time it takes the device to play a full buffer
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// A device (or file) that consumes interleaved f32 frames pulled by the playback loop.
///
/// Writes happen through one region at a time: `acquire_write_region` hands out
/// `frames * channels` samples, which belong to the caller until
/// `release_write_region` queues them for playback.
pub trait OutputSink {
    /// Format agreed with the device when the sink was opened
    fn format(&self) -> SinkFormat;

    fn start(&mut self) -> Result<()>;

    /// Stop playback. Resources are released when the sink is dropped.
    fn stop(&mut self) -> Result<()>;

    fn buffer_capacity_frames(&self) -> usize {
        self.format().buffer_frames
    }

    /// Frames that can be written without overrunning the queue
    fn current_free_frames(&mut self) -> Result<usize>;

    /// Borrow a writable region of `frames` frames. Fails if more than
    /// `current_free_frames` are requested or a region is already held.
    fn acquire_write_region(&mut self, frames: usize) -> Result<&mut [f32]>;

    /// Queue the first `frames` frames of the held region.
    ///
    /// `silent` marks the final region: the unwritten remainder of it is
    /// silence and no further audio follows.
    fn release_write_region(&mut self, frames: usize, silent: bool) -> Result<()>;

    /// Whether the sink drains in real time. The playback loop only paces
    /// itself against real-time sinks.
    fn is_realtime(&self) -> bool {
        true
    }
}

/// Tracks the single outstanding write region of a sink
#[derive(Debug, Default)]
pub(crate) struct RegionGuard {
    acquired: Option<usize>,
}

impl RegionGuard {
    pub(crate) fn acquire(&mut self, frames: usize, free: usize) -> Result<()> {
        if let Some(held) = self.acquired {
            return Err(Error::DeviceIo(format!(
                "write region of {} frames is still held",
                held
            )));
        }
        if frames > free {
            return Err(Error::DeviceIo(format!(
                "requested {} frames but only {} are free",
                frames, free
            )));
        }
        self.acquired = Some(frames);
        Ok(())
    }

    /// Returns the size of the region being released
    pub(crate) fn release(&mut self, frames: usize) -> Result<usize> {
        let held = self
            .acquired
            .take()
            .ok_or_else(|| Error::DeviceIo("no write region is held".to_string()))?;
        if frames > held {
            return Err(Error::DeviceIo(format!(
                "released {} frames from a region of {}",
                frames, held
            )));
        }
        Ok(held)
    }
}

/// Output to a system audio device through cpal
pub struct CpalSink {
    stream: Stream,
    producer: RingProducer,
    format: SinkFormat,
    scratch: Vec<f32>,
    region: RegionGuard,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl CpalSink {
    /// Open an output device and negotiate a format.
    ///
    /// `device_name` selects a device by name; the host default is used when absent.
    /// A stereo config at `sample_rate` is preferred; without one the device's
    /// default config is used as-is.
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        buffer_duration: Duration,
    ) -> Result<Self> {
        let device = find_device(device_name)?;
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let config = choose_config(&device, sample_rate)?;
        if config.sample_rate().0 != sample_rate {
            warn!(
                requested = sample_rate,
                device_rate = config.sample_rate().0,
                "Device does not support the source sample rate; playback speed will differ"
            );
        }

        let device_rate = config.sample_rate().0;
        let channels = config.channels();
        let sample_format = match config.sample_format() {
            cpal::SampleFormat::F32 => SampleFormat::F32,
            cpal::SampleFormat::I16 => SampleFormat::I16,
            cpal::SampleFormat::U16 => SampleFormat::U16,
            format => {
                return Err(Error::DeviceInit(format!(
                    "Unsupported sample format: {:?}",
                    format
                )))
            }
        };
        let buffer_frames =
            ((buffer_duration.as_secs_f64() * device_rate as f64).round() as usize).max(1);

        let rb = HeapRb::<f32>::new(buffer_frames * channels as usize);
        let (producer, consumer) = rb.split();

        let stream_error = Arc::new(Mutex::new(None));
        let stream_config: StreamConfig = config.into();
        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, consumer, stream_error.clone())?
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, consumer, stream_error.clone())?
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, consumer, stream_error.clone())?
            }
        };
        // Some hosts start streams as soon as they are built
        if let Err(e) = stream.pause() {
            warn!("Failed to pause new stream: {}", e);
        }

        let format = SinkFormat {
            sample_rate: device_rate,
            channels,
            sample_format,
            buffer_frames,
        };
        info!(
            device = %name,
            channels = format.channels,
            sample_rate = format.sample_rate,
            sample_format = ?format.sample_format,
            buffer_frames = format.buffer_frames,
            "Opened output device"
        );

        Ok(Self {
            stream,
            producer,
            format,
            scratch: vec![0.0; buffer_frames * channels as usize],
            region: RegionGuard::default(),
            stream_error,
        })
    }

    /// Fails with the first error reported by the audio thread, if any
    fn check_stream(&self) -> Result<()> {
        match self.stream_error.lock().take() {
            Some(e) => Err(Error::DeviceIo(e)),
            None => Ok(()),
        }
    }
}

impl OutputSink for CpalSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::DeviceIo(format!("Failed to start stream: {}", e)))
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::DeviceIo(format!("Failed to stop stream: {}", e)))
    }

    fn current_free_frames(&mut self) -> Result<usize> {
        self.check_stream()?;
        Ok(self.producer.vacant_len() / self.format.channels as usize)
    }

    fn acquire_write_region(&mut self, frames: usize) -> Result<&mut [f32]> {
        self.check_stream()?;
        let free = self.producer.vacant_len() / self.format.channels as usize;
        self.region.acquire(frames, free)?;
        let len = frames * self.format.channels as usize;
        self.scratch.resize(len.max(self.scratch.len()), 0.0);
        Ok(&mut self.scratch[..len])
    }

    fn release_write_region(&mut self, frames: usize, silent: bool) -> Result<()> {
        let held = self.region.release(frames)?;
        let channels = self.format.channels as usize;

        let queued = if silent {
            self.scratch[frames * channels..held * channels].fill(0.0);
            held
        } else {
            frames
        };
        let len = queued * channels;
        let written = self.producer.push_slice(&self.scratch[..len]);
        if written < len {
            return Err(Error::DeviceIo(format!(
                "ring buffer overrun: queued {} of {} samples",
                written, len
            )));
        }
        self.check_stream()
    }
}

/// Names of the available output devices
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| Error::DeviceInit(format!("Failed to enumerate devices: {}", e)))?;
    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "<unnamed>".to_string()))
        .collect())
}

fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| Error::DeviceInit(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| Error::DeviceInit(format!("No output device named {:?}", wanted))),
        None => host
            .default_output_device()
            .ok_or_else(|| Error::DeviceInit("No output device available".to_string())),
    }
}

fn choose_config(device: &cpal::Device, sample_rate: u32) -> Result<SupportedStreamConfig> {
    let rate = cpal::SampleRate(sample_rate);
    let supported = device
        .supported_output_configs()
        .map(|configs| {
            configs
                .filter(|c| c.channels() == 2)
                .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
                .filter(|c| {
                    matches!(
                        c.sample_format(),
                        cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
                    )
                })
                .max_by_key(|c| c.sample_format() == cpal::SampleFormat::F32)
        })
        .ok()
        .flatten();

    match supported {
        Some(range) => Ok(range.with_sample_rate(rate)),
        None => device
            .default_output_config()
            .map_err(|e| Error::DeviceInit(format!("Failed to get default output config: {}", e))),
    }
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: RingConsumer,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Underruns play as silence
                for sample in data.iter_mut() {
                    *sample = T::from_sample(consumer.try_pop().unwrap_or(0.0));
                }
            },
            move |err| {
                error!("Audio output error: {}", err);
                stream_error.lock().get_or_insert_with(|| err.to_string());
            },
            None,
        )
        .map_err(|e| Error::DeviceInit(format!("Failed to build output stream: {}", e)))
}
