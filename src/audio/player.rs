// Streaming playback loop
// Pulls binaural frames from the renderer whenever the sink has room for them
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audio::output::OutputSink;
use crate::error::{Error, Result};
use crate::spatial::renderer::{BinauralRenderer, StereoFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Sink not started yet
    Idle,
    /// Streaming chunks into the sink
    Started,
    /// Last chunk queued, waiting for the device to play it out
    Draining,
    /// Terminal
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_rendered: u64,
    pub chunks_written: u64,
}

pub struct Player<S: OutputSink> {
    renderer: BinauralRenderer,
    sink: S,
    state: PlayerState,
    frames: Vec<StereoFrame>,
    stats: PlaybackStats,
}

impl<S: OutputSink> Player<S> {
    pub fn new(renderer: BinauralRenderer, sink: S) -> Self {
        let capacity = sink.buffer_capacity_frames();
        Self {
            renderer,
            sink,
            state: PlayerState::Idle,
            frames: vec![StereoFrame::default(); capacity],
            stats: PlaybackStats::default(),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn renderer(&self) -> &BinauralRenderer {
        &self.renderer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Stream the whole source to the sink, blocking until it has played out.
    ///
    /// Any sink failure is fatal: the sink is stopped on a best-effort basis,
    /// the player ends in `Stopped` and the error is returned. A player plays once.
    pub fn play(&mut self) -> Result<PlaybackStats> {
        if self.state != PlayerState::Idle {
            return Err(Error::InvalidState(self.state));
        }

        match self.run() {
            Ok(()) => Ok(self.stats),
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn run(&mut self) -> Result<()> {
        let throttle = self.throttle();

        self.sink.start()?;
        self.transition(PlayerState::Started);

        loop {
            if let Some(interval) = throttle {
                thread::sleep(interval);
            }

            let free = self.sink.current_free_frames()?;
            if free == 0 {
                continue;
            }
            if self.write_chunk(free)? {
                break;
            }
        }

        self.transition(PlayerState::Draining);
        if let Some(interval) = throttle {
            thread::sleep(interval);
        }

        self.sink.stop()?;
        self.transition(PlayerState::Stopped);
        Ok(())
    }

    /// Fill one region of `free` frames. Returns true once the source is exhausted.
    fn write_chunk(&mut self, free: usize) -> Result<bool> {
        if self.frames.len() < free {
            self.frames.resize(free, StereoFrame::default());
        }
        let channels = (self.sink.format().channels as usize).max(1);

        let region = self.sink.acquire_write_region(free)?;
        let status = self.renderer.render_into(&mut self.frames[..free])?;
        interleave(&self.frames[..status.frames], region, channels);

        self.sink.release_write_region(status.frames, status.is_final)?;

        self.stats.frames_rendered += status.frames as u64;
        self.stats.chunks_written += 1;
        debug!(
            free,
            frames = status.frames,
            cursor = self.renderer.cursor(),
            "wrote chunk"
        );
        Ok(status.is_final)
    }

    /// Half the device buffer, for sinks that play in real time
    fn throttle(&self) -> Option<Duration> {
        self.sink
            .is_realtime()
            .then(|| self.sink.format().buffer_duration() / 2)
    }

    fn transition(&mut self, next: PlayerState) {
        info!(from = ?self.state, to = ?next, "Player state");
        self.state = next;
    }

    fn abort(&mut self) {
        if matches!(self.state, PlayerState::Started | PlayerState::Draining) {
            if let Err(e) = self.sink.stop() {
                warn!("Failed to stop sink after error: {}", e);
            }
        }
        self.transition(PlayerState::Stopped);
    }
}

/// Write stereo frames into an interleaved region of `channels` channels.
///
/// Mono sinks get the average of both ears; channels past the second are
/// silent. Region space past the last frame is zeroed.
fn interleave(frames: &[StereoFrame], region: &mut [f32], channels: usize) {
    let written = frames.len() * channels;
    for (frame, out) in frames.iter().zip(region.chunks_exact_mut(channels)) {
        match out {
            [mono] => *mono = (frame.left + frame.right) * 0.5,
            [left, right, rest @ ..] => {
                *left = frame.left;
                *right = frame.right;
                rest.fill(0.0);
            }
            [] => {}
        }
    }
    let len = region.len();
    region[written.min(len)..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::{RegionGuard, SampleFormat, SinkFormat};
    use crate::spatial::renderer::{RenderParams, DEFAULT_SAMPLE_RATE};
    use std::collections::VecDeque;

    /// Sink that drains instantly into memory
    struct MemorySink {
        format: SinkFormat,
        realtime: bool,
        scratch: Vec<f32>,
        region: RegionGuard,
        queued: Vec<f32>,
        releases: Vec<(usize, bool)>,
        free_script: VecDeque<usize>,
        started: bool,
        stop_calls: usize,
        fail_start: bool,
        fail_stop: bool,
        fail_acquire_after: Option<usize>,
        acquires: usize,
    }

    impl MemorySink {
        fn new(channels: u16, buffer_frames: usize) -> Self {
            Self {
                format: SinkFormat {
                    sample_rate: DEFAULT_SAMPLE_RATE,
                    channels,
                    sample_format: SampleFormat::F32,
                    buffer_frames,
                },
                realtime: false,
                scratch: Vec::new(),
                region: RegionGuard::default(),
                queued: Vec::new(),
                releases: Vec::new(),
                free_script: VecDeque::new(),
                started: false,
                stop_calls: 0,
                fail_start: false,
                fail_stop: false,
                fail_acquire_after: None,
                acquires: 0,
            }
        }

        fn queued_frames(&self) -> usize {
            self.queued.len() / self.format.channels as usize
        }
    }

    impl OutputSink for MemorySink {
        fn format(&self) -> SinkFormat {
            self.format
        }

        fn start(&mut self) -> Result<()> {
            if self.fail_start {
                return Err(Error::DeviceIo("start refused".to_string()));
            }
            self.started = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.stop_calls += 1;
            if self.fail_stop {
                return Err(Error::DeviceIo("stop refused".to_string()));
            }
            Ok(())
        }

        fn current_free_frames(&mut self) -> Result<usize> {
            Ok(self
                .free_script
                .pop_front()
                .unwrap_or(self.format.buffer_frames))
        }

        fn acquire_write_region(&mut self, frames: usize) -> Result<&mut [f32]> {
            if self.fail_acquire_after == Some(self.acquires) {
                return Err(Error::DeviceIo("device unplugged".to_string()));
            }
            self.acquires += 1;
            self.region.acquire(frames, self.format.buffer_frames)?;
            let len = frames * self.format.channels as usize;
            // Stale data, so the test notices unwritten samples
            self.scratch = vec![7.0; len];
            Ok(&mut self.scratch[..])
        }

        fn release_write_region(&mut self, frames: usize, silent: bool) -> Result<()> {
            self.region.release(frames)?;
            let len = frames * self.format.channels as usize;
            self.queued.extend_from_slice(&self.scratch[..len]);
            self.releases.push((frames, silent));
            Ok(())
        }

        fn is_realtime(&self) -> bool {
            self.realtime
        }
    }

    fn source(len: usize) -> Vec<i16> {
        (0..len).map(|i| ((i * 97) % 16_000) as i16 - 8_000).collect()
    }

    fn renderer(len: usize) -> BinauralRenderer {
        BinauralRenderer::new(source(len), DEFAULT_SAMPLE_RATE, 0.0, RenderParams::default())
            .unwrap()
    }

    #[test]
    fn test_streams_whole_source_then_stops() {
        let mut player = Player::new(renderer(1_000), MemorySink::new(2, 64));
        assert_eq!(player.state(), PlayerState::Idle);

        let stats = player.play().unwrap();
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(stats.frames_rendered, 1_000);
        assert_eq!(stats.chunks_written, 16);

        let sink = player.into_sink();
        assert!(sink.started);
        assert_eq!(sink.stop_calls, 1);
        assert_eq!(sink.queued_frames(), 1_000);
        assert_eq!(sink.releases.last(), Some(&(40, true)));
        assert!(sink.releases[..15].iter().all(|&(frames, silent)| frames == 64 && !silent));
    }

    #[test]
    fn test_output_matches_renderer() {
        let mut player = Player::new(renderer(500), MemorySink::new(2, 48));
        player.play().unwrap();
        let sink = player.into_sink();

        let expected = renderer(500).produce_frames(500).unwrap().frames;
        let actual: Vec<StereoFrame> = sink
            .queued
            .chunks_exact(2)
            .map(|s| StereoFrame { left: s[0], right: s[1] })
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_waits_while_sink_is_full() {
        let mut sink = MemorySink::new(2, 32);
        sink.free_script = VecDeque::from(vec![0, 0, 10, 0, 5]);
        let mut player = Player::new(renderer(100), sink);

        player.play().unwrap();
        let sink = player.into_sink();
        assert_eq!(sink.queued_frames(), 100);
        assert_eq!(sink.releases[0], (10, false));
        assert_eq!(sink.releases[1], (5, false));
    }

    #[test]
    fn test_mono_and_surround_layouts() {
        let mut player = Player::new(renderer(200), MemorySink::new(1, 64));
        player.play().unwrap();
        let mono = player.into_sink().queued;

        let mut player = Player::new(renderer(200), MemorySink::new(4, 64));
        player.play().unwrap();
        let quad = player.into_sink().queued;

        let stereo = renderer(200).produce_frames(200).unwrap().frames;
        assert_eq!(mono.len(), 200);
        assert_eq!(quad.len(), 800);
        for (i, frame) in stereo.iter().enumerate() {
            assert_eq!(mono[i], (frame.left + frame.right) * 0.5);
            assert_eq!(&quad[i * 4..i * 4 + 4], &[frame.left, frame.right, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_start_failure_is_fatal() {
        let mut sink = MemorySink::new(2, 64);
        sink.fail_start = true;
        let mut player = Player::new(renderer(100), sink);

        assert!(matches!(player.play(), Err(Error::DeviceIo(_))));
        assert_eq!(player.state(), PlayerState::Stopped);
        assert_eq!(player.sink().stop_calls, 0);
    }

    #[test]
    fn test_device_failure_mid_stream_stops_sink() {
        let mut sink = MemorySink::new(2, 64);
        sink.fail_acquire_after = Some(3);
        let mut player = Player::new(renderer(1_000), sink);

        assert!(matches!(player.play(), Err(Error::DeviceIo(_))));
        assert_eq!(player.state(), PlayerState::Stopped);

        let sink = player.into_sink();
        assert_eq!(sink.stop_calls, 1);
        assert_eq!(sink.queued_frames(), 3 * 64);
    }

    #[test]
    fn test_stop_failure_while_draining_still_ends_stopped() {
        let mut sink = MemorySink::new(2, 64);
        sink.fail_stop = true;
        let mut player = Player::new(renderer(100), sink);

        assert!(matches!(player.play(), Err(Error::DeviceIo(_))));
        assert_eq!(player.state(), PlayerState::Stopped);

        let sink = player.into_sink();
        // The drain stop, then the best-effort retry
        assert_eq!(sink.stop_calls, 2);
        assert_eq!(sink.queued_frames(), 100);
    }

    #[test]
    fn test_plays_only_once() {
        let mut player = Player::new(renderer(10), MemorySink::new(2, 64));
        player.play().unwrap();
        assert!(matches!(
            player.play(),
            Err(Error::InvalidState(PlayerState::Stopped))
        ));
    }

    #[test]
    fn test_realtime_sink_is_paced() {
        // 44 frames is about 1ms at 44.1kHz
        let mut sink = MemorySink::new(2, 44);
        sink.realtime = true;
        let mut player = Player::new(renderer(440), sink);

        let started = std::time::Instant::now();
        let stats = player.play().unwrap();
        assert_eq!(stats.chunks_written, 10);
        // Ten polls plus the drain, half a buffer each
        assert!(started.elapsed() >= Duration::from_micros(11 * 490));
    }

    #[test]
    fn test_interleave_zeroes_unwritten_tail() {
        let frames = [StereoFrame { left: 0.5, right: -0.5 }];
        let mut region = [9.0; 6];
        interleave(&frames, &mut region, 2);
        assert_eq!(region, [0.5, -0.5, 0.0, 0.0, 0.0, 0.0]);
    }
}
