// Binaural renderer
// Sweeps a mono source around the head and renders it to stereo frame by frame

use tracing::debug;

use crate::error::Result;
use crate::spatial::head::HeadModel;
use crate::spatial::polar::{EarSide, PolarResponse};

/// Rotation speed of the source, in radians per millisecond of playback time
pub const DEFAULT_RADIANS_PER_MS: f32 = 0.0008;

/// Extra gain applied on top of the ear response to leave headroom for the louder ear
pub const DEFAULT_BOOST: f32 = 0.8;

/// Output samples never exceed this magnitude
pub const DEFAULT_OUTPUT_CEILING: f32 = 0.99;

/// Sample rate assumed when the source does not report one
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// One output frame, left then right, normalized to `[-1, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

/// Frames returned by [`BinauralRenderer::produce_frames`]
#[derive(Debug, Clone, Default)]
pub struct RenderedChunk {
    pub frames: Vec<StereoFrame>,
    /// No frames follow this chunk
    pub is_final: bool,
}

/// Outcome of [`BinauralRenderer::render_into`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStatus {
    /// Number of leading frames of the output slice that were written
    pub frames: usize,
    pub is_final: bool,
}

/// Tunables of the renderer. Defaults reproduce the reference sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub radians_per_ms: f32,
    pub boost: f32,
    pub output_ceiling: f32,
    pub head: HeadModel,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            radians_per_ms: DEFAULT_RADIANS_PER_MS,
            boost: DEFAULT_BOOST,
            output_ceiling: DEFAULT_OUTPUT_CEILING,
            head: HeadModel::default(),
        }
    }
}

pub struct BinauralRenderer {
    source: Vec<i16>,
    sample_rate: u32,
    params: RenderParams,
    left_ear: PolarResponse,
    right_ear: PolarResponse,

    // Sweep start; the azimuth at playback time t is `initial_azimuth + rate * t`
    initial_azimuth: f32,
    cursor: usize,

    // Per-frame state, overwritten every frame
    azimuth: f32,
    left_boost: f32,
    right_boost: f32,
    itd: f32,
}

impl BinauralRenderer {
    /// Create a renderer over a mono source.
    ///
    /// `initial_azimuth` is the source position in radians at playback time zero
    /// (0 ahead, positive towards the right ear). The renderer owns `source` for its lifetime.
    pub fn new(
        source: Vec<i16>,
        sample_rate: u32,
        initial_azimuth: f32,
        params: RenderParams,
    ) -> Result<Self> {
        let mut renderer = Self {
            source,
            sample_rate: sample_rate.max(1),
            params,
            left_ear: PolarResponse::for_ear(EarSide::Left),
            right_ear: PolarResponse::for_ear(EarSide::Right),
            initial_azimuth,
            cursor: 0,
            azimuth: initial_azimuth,
            left_boost: 1.0,
            right_boost: 1.0,
            itd: 0.0,
        };
        renderer.update_position(initial_azimuth)?;
        Ok(renderer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total number of source samples
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Index of the next source sample to be rendered
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.source.len() - self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.source.len()
    }

    /// Current source azimuth in radians
    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    /// Current interaural delay in seconds
    pub fn itd(&self) -> f32 {
        self.itd
    }

    /// Current linear gains as (left, right)
    pub fn ear_gains(&self) -> (f32, f32) {
        (self.left_boost, self.right_boost)
    }

    /// Azimuth at `frame` samples into playback
    fn azimuth_at(&self, frame: usize) -> f32 {
        let elapsed_ms = frame as f64 / self.sample_rate as f64 * 1000.0;
        self.initial_azimuth + (elapsed_ms * self.params.radians_per_ms as f64) as f32
    }

    fn update_position(&mut self, azimuth: f32) -> Result<()> {
        self.azimuth = azimuth;
        self.left_boost = self.left_ear.gain(azimuth)?;
        self.right_boost = self.right_ear.gain(azimuth)?;
        self.itd = self.params.head.interaural_delay(azimuth)?;
        Ok(())
    }

    /// Render up to `max_frames` frames.
    ///
    /// The last chunk is truncated to exactly the remaining source and flagged
    /// final; it is never padded with silence.
    pub fn produce_frames(&mut self, max_frames: usize) -> Result<RenderedChunk> {
        let mut frames = vec![StereoFrame::default(); max_frames.min(self.remaining())];
        let status = self.render_into(&mut frames)?;
        frames.truncate(status.frames);
        Ok(RenderedChunk {
            frames,
            is_final: status.is_final,
        })
    }

    /// Render into `out`, writing at most `out.len()` frames from its start.
    ///
    /// Gains and delay are recomputed for every frame. Reaching the end of the
    /// source, including landing exactly on it, flags the result final.
    pub fn render_into(&mut self, out: &mut [StereoFrame]) -> Result<RenderStatus> {
        let remaining = self.remaining();
        let is_final = out.len() >= remaining;
        let count = out.len().min(remaining);

        let rate = self.sample_rate as f64;
        for (i, frame) in out[..count].iter_mut().enumerate() {
            let position = self.cursor + i;
            self.update_position(self.azimuth_at(position))?;

            let half_shift = self.itd as f64 * rate / 2.0;
            let left_index = (position as f64 - half_shift).floor() as i64;
            let right_index = (position as f64 + half_shift).floor() as i64;

            *frame = StereoFrame {
                left: self.ear_sample(left_index, self.left_boost),
                right: self.ear_sample(right_index, self.right_boost),
            };
        }

        self.cursor += count;
        debug!(
            frames = count,
            cursor = self.cursor,
            azimuth = self.azimuth,
            itd = self.itd,
            is_final,
            "rendered chunk"
        );

        Ok(RenderStatus {
            frames: count,
            is_final,
        })
    }

    /// One ear's sample read from the delay line at `index`, normalized and clamped.
    ///
    /// Indices outside the source read as silence.
    fn ear_sample(&self, index: i64, gain: f32) -> f32 {
        let raw = match usize::try_from(index).ok().and_then(|i| self.source.get(i)) {
            Some(&sample) => sample,
            None => return 0.0,
        };
        let scaled = (raw as f32 * gain * self.params.boost).clamp(-32767.0, 32767.0) as i16;
        let ceiling = self.params.output_ceiling;
        (scaled as f32 / 32768.0).clamp(-ceiling, ceiling)
    }
}
