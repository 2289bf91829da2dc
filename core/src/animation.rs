use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Size};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Scattered,
    Moving,
    Complete,
}

/// Token identifying one animation run. Only the run whose token matches the
/// scheduler's current token may publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Generation {
        Generation(self.0.wrapping_add(1))
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Generation(value)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

pub fn progress(elapsed_ms: f64, duration_ms: u32) -> f32 {
    if duration_ms == 0 {
        return 1.0;
    }
    (elapsed_ms / duration_ms as f64).clamp(0.0, 1.0) as f32
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationRun {
    pub generation: Generation,
    /// Unset until the run leaves `Scattered`.
    pub start_time_ms: Option<f64>,
    pub duration_ms: u32,
    pub phase: Phase,
    pub source: Vec<Point>,
    pub target: Vec<Point>,
    pub source_size: Size,
    pub target_size: Size,
    pub(crate) last_progress: f32,
}

impl AnimationRun {
    pub fn new(
        generation: Generation,
        duration_ms: u32,
        source: Vec<Point>,
        source_size: Size,
        target: Vec<Point>,
        target_size: Size,
    ) -> Self {
        Self {
            generation,
            start_time_ms: None,
            duration_ms,
            phase: Phase::Scattered,
            source,
            target,
            source_size,
            target_size,
            last_progress: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Progress at `now_ms`, never lower than the last observed value.
    pub fn progress_at(&self, now_ms: f64) -> f32 {
        let Some(start) = self.start_time_ms else {
            return 0.0;
        };
        progress(now_ms - start, self.duration_ms).max(self.last_progress)
    }
}

/// Frame as seen by the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSnapshot {
    pub generation: Generation,
    pub phase: Phase,
    pub progress: f32,
    pub positions: Vec<Point>,
    pub piece_size: Size,
    /// Frames computed for this run when the snapshot was taken.
    pub frame: u64,
}

impl FrameSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: Generation::ZERO,
            phase: Phase::Idle,
            progress: 0.0,
            positions: Vec::new(),
            piece_size: Size::default(),
            frame: 0,
        }
    }
}
