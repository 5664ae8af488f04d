//! Frame scheduling.
//!
//! The render loop asks a [`FrameScheduler`] for the next frame and draws it,
//! until the scheduler runs out. Swapping the scheduler is how the same loop
//! runs headless in tests ([`FixedFrames`]) or paced by the wall clock
//! ([`IntervalScheduler`]).
//!
//! ```
//! use orrery::app::{FixedFrames, run_loop};
//!
//! let mut times = Vec::new();
//! let frames = run_loop(&mut FixedFrames::new(3, 0.5), |frame| {
//!     times.push(frame.time);
//!     Ok::<_, std::convert::Infallible>(())
//! })?;
//! assert_eq!(frames, 3);
//! assert_eq!(times, [0.0, 0.5, 1.0]);
//! # Ok::<(), std::convert::Infallible>(())
//! ```

use std::time::{Duration, Instant};

/// Timing of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Zero-based frame number.
    pub index: u64,
    /// Seconds since the first frame.
    pub time: f32,
    /// Seconds since the previous frame, zero for the first.
    pub dt: f32,
}

impl FrameTime {
    pub fn fps(&self) -> f32 {
        if self.dt > 0.0 { 1.0 / self.dt } else { 0.0 }
    }
}

/// Decides when the next frame happens.
pub trait FrameScheduler {
    /// Blocks until the next frame is due. `None` ends the loop.
    fn next_frame(&mut self) -> Option<FrameTime>;
}

/// A fixed number of frames with a constant simulated step, returned
/// immediately.
#[derive(Debug, Clone)]
pub struct FixedFrames {
    count: u64,
    step: f32,
    next: u64,
}

impl FixedFrames {
    pub fn new(count: u64, step: f32) -> Self {
        Self {
            count,
            step,
            next: 0,
        }
    }
}

impl FrameScheduler for FixedFrames {
    fn next_frame(&mut self) -> Option<FrameTime> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(FrameTime {
            index,
            time: index as f32 * self.step,
            dt: if index == 0 { 0.0 } else { self.step },
        })
    }
}

/// Paces frames at a fixed interval of real time, optionally stopping after
/// a number of frames.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    limit: Option<u64>,
    index: u64,
    start: Option<Instant>,
    last: Option<Instant>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            limit: None,
            index: 0,
            start: None,
            last: None,
        }
    }

    /// Roughly `fps` frames per second.
    pub fn per_second(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }

    pub fn limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl FrameScheduler for IntervalScheduler {
    fn next_frame(&mut self) -> Option<FrameTime> {
        if self.limit.is_some_and(|limit| self.index >= limit) {
            return None;
        }
        if let Some(last) = self.last {
            let due = last + self.interval;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let now = Instant::now();
        let start = *self.start.get_or_insert(now);
        let dt = self.last.map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last = Some(now);
        let index = self.index;
        self.index += 1;
        Some(FrameTime {
            index,
            time: now.duration_since(start).as_secs_f32(),
            dt,
        })
    }
}

/// Runs `frame` for every frame `scheduler` produces. Stops at the first
/// error and returns it; otherwise returns the number of frames drawn.
pub fn run_loop<S, F, E>(scheduler: &mut S, mut frame: F) -> Result<u64, E>
where
    S: FrameScheduler + ?Sized,
    F: FnMut(&FrameTime) -> Result<(), E>,
{
    let mut drawn = 0;
    while let Some(time) = scheduler.next_frame() {
        frame(&time)?;
        drawn += 1;
    }
    log::debug!("frame loop finished after {drawn} frames");
    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_frames_step_evenly() {
        let mut frames = FixedFrames::new(2, 0.25);
        let first = frames.next_frame().unwrap();
        assert_eq!(first, FrameTime { index: 0, time: 0.0, dt: 0.0 });
        assert_eq!(first.fps(), 0.0);
        let second = frames.next_frame().unwrap();
        assert_eq!(second.dt, 0.25);
        assert_eq!(second.fps(), 4.0);
        assert!(frames.next_frame().is_none());
    }

    #[test]
    fn loop_stops_on_error() {
        let mut frames = FixedFrames::new(10, 1.0);
        let result = run_loop(&mut frames, |frame| {
            if frame.index == 3 { Err(frame.index) } else { Ok(()) }
        });
        assert_eq!(result, Err(3));
    }

    #[test]
    fn interval_scheduler_paces_and_stops() {
        let mut scheduler = IntervalScheduler::new(Duration::from_millis(5)).limit(3);
        let started = Instant::now();
        let drawn = run_loop(&mut scheduler, |_| Ok::<_, ()>(())).unwrap();
        assert_eq!(drawn, 3);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(scheduler.next_frame().is_none());
    }

    #[test]
    fn trait_objects_drive_the_loop() {
        let mut scheduler: Box<dyn FrameScheduler> = Box::new(FixedFrames::new(1, 0.1));
        assert_eq!(run_loop(scheduler.as_mut(), |_| Ok::<_, ()>(())), Ok(1));
    }
}
