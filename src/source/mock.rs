//! Synthetic frame source for development and testing.
//!
//! Generates dark frames with mild sensor noise and, on most frames, one
//! bright elliptical blob drifting left to right through the frame at a
//! jittered vertical position. The first frame is blank so it can serve as
//! the background. Paced to the configured target FPS.

use crate::core::{AcquiredFrame, FrameGeometry, FrameSource};
use crate::error::AppResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Synthetic paced frame source.
pub struct MockFrameSource {
    geometry: FrameGeometry,
    frame_interval: Duration,
    rng: StdRng,
    next_id: u64,
    frame_limit: Option<u64>,
    started: Option<Instant>,
}

impl MockFrameSource {
    /// Source producing `geometry`-sized frames at `target_fps`.
    pub fn new(geometry: FrameGeometry, target_fps: u32) -> Self {
        Self {
            geometry,
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1))),
            rng: StdRng::seed_from_u64(0x5eed),
            next_id: 0,
            frame_limit: None,
            started: None,
        }
    }

    /// Stop after `limit` frames instead of running until shutdown.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn render(&mut self) -> Vec<u8> {
        let (w, h) = (self.geometry.width, self.geometry.height);
        let mut data = vec![0u8; w * h];
        for px in data.iter_mut() {
            *px = self.rng.gen_range(0..4);
        }
        // First frame stays blank noise: the processing stage adopts it as
        // the background.
        if self.next_id == 0 {
            return data;
        }

        // A blob sweeping across the frame, one crossing per 60 frames.
        let phase = (self.next_id % 60) as f64 / 60.0;
        let cx = phase * w as f64;
        let cy = h as f64 / 2.0 + self.rng.gen_range(-4.0..4.0);
        let rx = 8.0 + self.rng.gen_range(0.0..3.0);
        let ry = rx * self.rng.gen_range(0.7..1.0);
        for y in 0..h {
            for x in 0..w {
                let dx = (x as f64 - cx) / rx;
                let dy = (y as f64 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 {
                    data[y * w + x] = 200;
                }
            }
        }
        data
    }
}

impl FrameSource for MockFrameSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn acquire_next(&mut self) -> AppResult<Option<AcquiredFrame>> {
        if self.frame_limit.is_some_and(|limit| self.next_id >= limit) {
            return Ok(None);
        }
        // Pace against absolute time so render cost does not drift the rate.
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + self.frame_interval * self.next_id as u32;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        let data = self.render();
        let frame = AcquiredFrame {
            data,
            frame_id: self.next_id,
            timestamp_us: crate::core::now_us(),
            incomplete: false,
        };
        self.next_id += 1;
        Ok(Some(frame))
    }
}
