//! Render loop
//!
//! Cooperative frame pump driven by host ticks. At most one tick is
//! scheduled at a time and each carries a generation; a tick whose
//! generation is stale (or was cancelled by `stop`) does nothing.
//!
//! Video mode samples the current picture each tick while playing.
//! Socket mode draws on arrival, holding at most one pending frame while
//! the sink is busy.

use fos_render::{Frame, FrameSink};
use tracing::{debug, trace, warn};

/// Asks the host for a future tick, e.g. a window redraw
pub trait FrameScheduler {
    fn request_tick(&mut self);
}

/// A source the loop can sample pictures from
pub trait PictureSource {
    fn is_playing(&self) -> bool;
    fn current_picture(&self) -> Option<Frame>;
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Drawn,
    /// The previous draw is still in flight
    Busy,
    /// Nothing to draw; the loop went idle
    Idle,
    /// Not scheduled, or cancelled by `stop`
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub draws: u64,
    pub dropped: u64,
    pub failed: u64,
}

pub struct RenderLoop {
    running: bool,
    generation: u64,
    scheduled: Option<u64>,
    pending: Option<Frame>,
    stats: LoopStats,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderLoop {
    pub fn new() -> Self {
        Self {
            running: false,
            generation: 0,
            scheduled: None,
            pending: None,
            stats: LoopStats::default(),
        }
    }

    pub fn has_scheduled_tick(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Start pulling frames on every tick
    pub fn start_video(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.running = true;
        self.schedule(scheduler);
    }

    /// Accept pushed frames; nothing is scheduled until one arrives
    pub fn start_socket(&mut self) {
        self.running = true;
    }

    /// Cancel the scheduled tick and drop any pending frame. After this
    /// returns no draw happens until the loop is started again.
    pub fn stop(&mut self) {
        if self.running || self.scheduled.is_some() || self.pending.is_some() {
            debug!("Render loop stopped after {} draws", self.stats.draws);
        }
        self.running = false;
        self.scheduled = None;
        self.generation += 1;
        if self.pending.take().is_some() {
            self.stats.dropped += 1;
        }
    }

    fn schedule(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.scheduled.is_some() {
            return;
        }
        self.generation += 1;
        self.scheduled = Some(self.generation);
        scheduler.request_tick();
    }

    /// Consume the scheduled tick; false when it is stale or cancelled
    fn begin_tick(&mut self) -> bool {
        match self.scheduled.take() {
            Some(generation) if generation == self.generation && self.running => true,
            Some(_) => {
                trace!("Ignoring stale tick");
                false
            }
            None => false,
        }
    }

    fn draw(&mut self, sink: &mut dyn FrameSink, frame: Frame) -> TickOutcome {
        match sink.draw(frame) {
            Ok(()) => {
                self.stats.draws += 1;
                TickOutcome::Drawn
            }
            Err(e) => {
                warn!("Dropping frame: {}", e);
                self.stats.failed += 1;
                TickOutcome::Idle
            }
        }
    }

    /// One video tick: sample and draw while the source plays
    pub fn tick_video(
        &mut self,
        source: &dyn PictureSource,
        sink: &mut dyn FrameSink,
        scheduler: &mut dyn FrameScheduler,
    ) -> TickOutcome {
        if !self.begin_tick() {
            return TickOutcome::Cancelled;
        }

        if !source.is_playing() {
            debug!("Source not playing, render loop idle");
            self.running = false;
            return TickOutcome::Idle;
        }

        let outcome = if sink.is_busy() {
            TickOutcome::Busy
        } else {
            match source.current_picture() {
                Some(frame) => self.draw(sink, frame),
                None => TickOutcome::Idle,
            }
        };

        self.schedule(scheduler);
        outcome
    }

    /// A socket frame arrived: draw now, or hold it for the next tick
    pub fn offer(
        &mut self,
        frame: Frame,
        sink: &mut dyn FrameSink,
        scheduler: &mut dyn FrameScheduler,
    ) -> TickOutcome {
        if !self.running {
            self.stats.dropped += 1;
            return TickOutcome::Cancelled;
        }

        if sink.is_busy() || self.scheduled.is_some() {
            if self.pending.replace(frame).is_some() {
                self.stats.dropped += 1;
            }
            self.schedule(scheduler);
            return TickOutcome::Busy;
        }

        self.draw(sink, frame)
    }

    /// One socket tick: draw the pending frame if the sink is free
    pub fn tick_socket(&mut self, sink: &mut dyn FrameSink, scheduler: &mut dyn FrameScheduler) -> TickOutcome {
        if !self.begin_tick() {
            return TickOutcome::Cancelled;
        }

        let Some(frame) = self.pending.take() else {
            return TickOutcome::Idle;
        };

        if sink.is_busy() {
            self.pending = Some(frame);
            self.schedule(scheduler);
            return TickOutcome::Busy;
        }

        self.draw(sink, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_render::PipelineError;
    use std::cell::Cell;

    #[derive(Default)]
    struct RecordingSink {
        drawn: Vec<u8>,
        busy: bool,
        overlapped: bool,
    }

    impl FrameSink for RecordingSink {
        fn draw(&mut self, frame: Frame) -> Result<(), PipelineError> {
            if self.busy {
                self.overlapped = true;
            }
            self.drawn.push(frame.pixels()[0]);
            Ok(())
        }

        fn is_busy(&self) -> bool {
            self.busy
        }
    }

    #[derive(Default)]
    struct CountingScheduler {
        requests: u32,
    }

    impl FrameScheduler for CountingScheduler {
        fn request_tick(&mut self) {
            self.requests += 1;
        }
    }

    struct Clip {
        playing: Cell<bool>,
        shade: Cell<u8>,
    }

    impl PictureSource for Clip {
        fn is_playing(&self) -> bool {
            self.playing.get()
        }

        fn current_picture(&self) -> Option<Frame> {
            let shade = self.shade.get();
            self.shade.set(shade + 1);
            Some(Frame::solid(1, 1, [shade, 0, 0, 255]))
        }
    }

    fn frame(shade: u8) -> Frame {
        Frame::solid(1, 1, [shade, 0, 0, 255])
    }

    #[test]
    fn test_video_loop_free_runs_while_playing() {
        let clip = Clip { playing: Cell::new(true), shade: Cell::new(0) };
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();

        render_loop.start_video(&mut scheduler);
        for _ in 0..3 {
            assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Drawn);
        }

        assert_eq!(sink.drawn, vec![0, 1, 2]);
        assert_eq!(scheduler.requests, 4);
    }

    #[test]
    fn test_video_pause_halts_within_one_tick() {
        let clip = Clip { playing: Cell::new(true), shade: Cell::new(0) };
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();

        render_loop.start_video(&mut scheduler);
        render_loop.tick_video(&clip, &mut sink, &mut scheduler);

        clip.playing.set(false);
        assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Idle);
        assert!(!render_loop.has_scheduled_tick());
        assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Cancelled);
        assert_eq!(sink.drawn.len(), 1);
    }

    #[test]
    fn test_busy_sink_skips_instead_of_queueing() {
        let clip = Clip { playing: Cell::new(true), shade: Cell::new(0) };
        let mut sink = RecordingSink { busy: true, ..Default::default() };
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();

        render_loop.start_video(&mut scheduler);
        assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Busy);
        assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Busy);

        sink.busy = false;
        assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Drawn);
        // Skipped ticks never sampled a picture
        assert_eq!(sink.drawn, vec![0]);
    }

    #[test]
    fn test_no_draws_after_stop() {
        let clip = Clip { playing: Cell::new(true), shade: Cell::new(0) };
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();

        render_loop.start_video(&mut scheduler);
        render_loop.stop();
        render_loop.stop();

        assert_eq!(render_loop.tick_video(&clip, &mut sink, &mut scheduler), TickOutcome::Cancelled);
        assert_eq!(render_loop.offer(frame(7), &mut sink, &mut scheduler), TickOutcome::Cancelled);
        assert_eq!(render_loop.tick_socket(&mut sink, &mut scheduler), TickOutcome::Cancelled);
        assert!(sink.drawn.is_empty());
    }

    #[test]
    fn test_socket_frames_draw_on_arrival_in_order() {
        let mut sink = RecordingSink::default();
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();
        render_loop.start_socket();

        for shade in [1, 2, 3] {
            assert_eq!(render_loop.offer(frame(shade), &mut sink, &mut scheduler), TickOutcome::Drawn);
        }

        assert_eq!(sink.drawn, vec![1, 2, 3]);
        assert_eq!(scheduler.requests, 0);
        assert!(!sink.overlapped);
    }

    #[test]
    fn test_socket_newest_pending_frame_wins() {
        let mut sink = RecordingSink { busy: true, ..Default::default() };
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();
        render_loop.start_socket();

        assert_eq!(render_loop.offer(frame(1), &mut sink, &mut scheduler), TickOutcome::Busy);
        assert_eq!(render_loop.offer(frame(2), &mut sink, &mut scheduler), TickOutcome::Busy);
        assert_eq!(scheduler.requests, 1);
        assert_eq!(render_loop.stats().dropped, 1);

        assert_eq!(render_loop.tick_socket(&mut sink, &mut scheduler), TickOutcome::Busy);
        sink.busy = false;
        assert_eq!(render_loop.tick_socket(&mut sink, &mut scheduler), TickOutcome::Drawn);
        assert_eq!(sink.drawn, vec![2]);
        assert!(!sink.overlapped);

        // Nothing pending: the loop stays quiet
        assert_eq!(render_loop.tick_socket(&mut sink, &mut scheduler), TickOutcome::Cancelled);
    }

    #[test]
    fn test_stop_drops_pending_frame() {
        let mut sink = RecordingSink { busy: true, ..Default::default() };
        let mut scheduler = CountingScheduler::default();
        let mut render_loop = RenderLoop::new();
        render_loop.start_socket();

        render_loop.offer(frame(1), &mut sink, &mut scheduler);
        render_loop.stop();
        sink.busy = false;

        assert!(!render_loop.has_pending_frame());
        assert_eq!(render_loop.tick_socket(&mut sink, &mut scheduler), TickOutcome::Cancelled);
        assert!(sink.drawn.is_empty());
    }
}
