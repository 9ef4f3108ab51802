//! Replay source: re-feeds raw frame dumps from disk.
//!
//! Reads `*.raw` files from a directory in lexical order — the order the
//! frame exporter writes them — and delivers them as frames at the target
//! rate. Exhausting the directory ends the run cleanly.

use crate::core::{AcquiredFrame, FrameGeometry, FrameSource};
use crate::error::{AppResult, CytoError};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Paced file-replay frame source.
pub struct ReplayFrameSource {
    geometry: FrameGeometry,
    frame_interval: Duration,
    files: Vec<PathBuf>,
    next_index: usize,
    started: Option<Instant>,
}

impl ReplayFrameSource {
    /// Scan `dir` for `.raw` frame files.
    pub fn new(dir: &Path, geometry: FrameGeometry, target_fps: u32) -> AppResult<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "raw"))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(CytoError::Acquisition(format!(
                "no .raw frames found in {}",
                dir.display()
            )));
        }
        info!(frames = files.len(), dir = %dir.display(), "Replay source ready");
        Ok(Self {
            geometry,
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(target_fps.max(1))),
            files,
            next_index: 0,
            started: None,
        })
    }
}

impl FrameSource for ReplayFrameSource {
    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    fn acquire_next(&mut self) -> AppResult<Option<AcquiredFrame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };
        let data = fs::read(path)?;
        if data.len() != self.geometry.frame_size() {
            return Err(CytoError::Acquisition(format!(
                "{}: {} bytes, expected {} for {}x{}",
                path.display(),
                data.len(),
                self.geometry.frame_size(),
                self.geometry.width,
                self.geometry.height
            )));
        }

        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + self.frame_interval * self.next_index as u32;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        let frame = AcquiredFrame {
            data,
            frame_id: self.next_index as u64,
            timestamp_us: crate::core::now_us(),
            incomplete: false,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_frame(dir: &Path, name: &str, fill: u8, len: usize) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(&vec![fill; len]).unwrap();
    }

    #[test]
    fn replays_frames_in_lexical_order_then_ends() {
        let tmp = tempfile::tempdir().unwrap();
        write_frame(tmp.path(), "frame_00001.raw", 2, 16);
        write_frame(tmp.path(), "frame_00000.raw", 1, 16);
        write_frame(tmp.path(), "notes.txt", 9, 3);

        let geometry = FrameGeometry {
            width: 4,
            height: 4,
        };
        let mut source = ReplayFrameSource::new(tmp.path(), geometry, 100_000).unwrap();

        assert_eq!(source.acquire_next().unwrap().unwrap().data[0], 1);
        assert_eq!(source.acquire_next().unwrap().unwrap().data[0], 2);
        assert!(source.acquire_next().unwrap().is_none());
    }

    #[test]
    fn rejects_empty_directory_and_bad_sizes() {
        let tmp = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry {
            width: 4,
            height: 4,
        };
        assert!(ReplayFrameSource::new(tmp.path(), geometry, 100).is_err());

        write_frame(tmp.path(), "frame_00000.raw", 1, 7);
        let mut source = ReplayFrameSource::new(tmp.path(), geometry, 100_000).unwrap();
        assert!(matches!(
            source.acquire_next(),
            Err(CytoError::Acquisition(_))
        ));
    }
}
