//! CPU frame timing for `--cpuprofile`.
//!
//! Memory stays fixed however long the session runs: running totals for the
//! mean, min and max, and a histogram of 100 µs buckets for the percentile.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;

const BUCKET: Duration = Duration::from_micros(100);
/// One second of 100 µs buckets; slower frames share the last one.
const BUCKETS: usize = 10_000;

pub struct FrameProfiler {
    frames: usize,
    total: Duration,
    min: Duration,
    max: Duration,
    histogram: Box<[u32]>,
}

/// Summary over every recorded frame. `p95` is resolved to 100 µs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub frames: usize,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p95: Duration,
    pub total: Duration,
}

impl FrameProfiler {
    pub fn new() -> Self {
        Self {
            frames: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            histogram: vec![0; BUCKETS].into_boxed_slice(),
        }
    }

    pub fn record(&mut self, frame: Duration) {
        self.frames += 1;
        self.total += frame;
        self.min = self.min.min(frame);
        self.max = self.max.max(frame);
        let slot = bucket_of(frame);
        self.histogram[slot] = self.histogram[slot].saturating_add(1);
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// `None` until at least one frame is recorded.
    pub fn report(&self) -> Option<FrameReport> {
        if self.frames == 0 {
            return None;
        }
        // Nearest-rank percentile over the histogram.
        let rank = (self.frames * 95).div_ceil(100).max(1);
        let mut seen = 0usize;
        let slot = self
            .histogram
            .iter()
            .position(|&count| {
                seen += count as usize;
                seen >= rank
            })
            .unwrap_or(BUCKETS - 1);
        let p95 = (BUCKET * slot as u32).clamp(self.min, self.max);

        Some(FrameReport {
            frames: self.frames,
            mean: u32::try_from(self.frames)
                .map_or_else(|_| self.total.div_f64(self.frames as f64), |n| self.total / n),
            min: self.min,
            max: self.max,
            p95,
            total: self.total,
        })
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let body = match self.report() {
            Some(report) => report.to_string(),
            None => "frames: 0\n".to_owned(),
        };
        fs::write(path, body)
            .with_context(|| format!("Failed to write CPU profile to {}", path.display()))?;
        log::info!("CPU profile written to {}", path.display());
        Ok(())
    }
}

impl Default for FrameProfiler {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_of(frame: Duration) -> usize {
    let slot = frame.as_nanos() / BUCKET.as_nanos();
    usize::try_from(slot).map_or(BUCKETS - 1, |slot| slot.min(BUCKETS - 1))
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        writeln!(f, "frames: {}", self.frames)?;
        writeln!(f, "mean_ms: {:.3}", ms(self.mean))?;
        writeln!(f, "min_ms: {:.3}", ms(self.min))?;
        writeln!(f, "max_ms: {:.3}", ms(self.max))?;
        writeln!(f, "p95_ms: {:.3}", ms(self.p95))?;
        writeln!(f, "total_ms: {:.3}", ms(self.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn empty_profiler_has_no_report() {
        assert_eq!(FrameProfiler::new().report(), None);
    }

    #[test]
    fn report_summarises_frames() {
        let mut profiler = FrameProfiler::new();
        // Recorded out of order on purpose.
        for n in (1..=20).rev() {
            profiler.record(ms(n));
        }
        let report = profiler.report().unwrap();
        assert_eq!(report.frames, 20);
        assert_eq!(report.min, ms(1));
        assert_eq!(report.max, ms(20));
        assert_eq!(report.p95, ms(19));
        assert_eq!(report.total, ms(210));
        assert_eq!(report.mean, Duration::from_micros(10_500));
    }

    #[test]
    fn single_frame_is_its_own_percentile() {
        let mut profiler = FrameProfiler::new();
        profiler.record(ms(16));
        let report = profiler.report().unwrap();
        assert_eq!(report.p95, ms(16));
        assert_eq!(report.mean, ms(16));
    }

    #[test]
    fn long_sessions_do_not_grow_and_keep_exact_totals() {
        let mut profiler = FrameProfiler::new();
        for _ in 0..100_000 {
            profiler.record(ms(2));
        }
        // One outlier past the histogram range lands in the last bucket.
        profiler.record(Duration::from_secs(3));

        assert_eq!(profiler.histogram.len(), BUCKETS);
        let report = profiler.report().unwrap();
        assert_eq!(report.frames, 100_001);
        assert_eq!(report.max, Duration::from_secs(3));
        assert_eq!(report.min, ms(2));
        assert_eq!(report.total, ms(200_000) + Duration::from_secs(3));
        assert_eq!(report.p95, ms(2));
    }

    #[test]
    fn percentile_stays_within_observed_range() {
        let mut profiler = FrameProfiler::new();
        // Both frames share one bucket whose lower bound is below the minimum.
        profiler.record(Duration::from_micros(16_650));
        profiler.record(Duration::from_micros(16_680));
        let report = profiler.report().unwrap();
        assert_eq!(report.p95, Duration::from_micros(16_650));
        assert_eq!(bucket_of(Duration::MAX), BUCKETS - 1);
    }

    #[test]
    fn writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu.prof");

        let mut profiler = FrameProfiler::new();
        profiler.record(ms(4));
        profiler.record(ms(8));
        profiler.write_to(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("frames: 2\n"));
        assert!(text.contains("mean_ms: 6.000"));
        assert!(text.contains("total_ms: 12.000"));
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cpu.prof");
        assert!(FrameProfiler::new().write_to(&path).is_err());
    }
}
