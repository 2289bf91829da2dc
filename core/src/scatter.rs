use rand::Rng;

use crate::error::EngineError;
use crate::geometry::{Point, Rect};

pub const SCATTER_MAX_ATTEMPTS_DEFAULT: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatterParams {
    pub region: Rect,
    pub piece_size: f32,
    pub padding: f32,
    pub max_attempts: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScatterLayout {
    /// Top-left corner of each piece, in input order.
    pub positions: Vec<Point>,
    /// Pieces that were placed after the attempt bound ran out.
    pub degraded: usize,
}

pub fn positions_separated(a: Point, b: Point, min_gap: f32) -> bool {
    (a.x - b.x).abs() >= min_gap || (a.y - b.y).abs() >= min_gap
}

/// Greedy random placement. Each piece takes the first sample that clears
/// every previously placed piece by `piece_size + padding` on some axis, or
/// its last sample once `max_attempts` are used up.
pub fn scatter_layout<R: Rng>(
    count: usize,
    params: &ScatterParams,
    rng: &mut R,
) -> Result<ScatterLayout, EngineError> {
    let size = params.piece_size;
    if !size.is_finite() || size <= 0.0 {
        return Err(EngineError::geometry(format!(
            "scatter piece size must be positive, got {size}"
        )));
    }
    if !params.padding.is_finite() || params.padding < 0.0 {
        return Err(EngineError::geometry(format!(
            "scatter padding must be non-negative, got {}",
            params.padding
        )));
    }
    params.region.size.require_positive("scatter region")?;

    let min_x = params.region.origin.x;
    let min_y = params.region.origin.y;
    let span_x = (params.region.size.width - size).max(0.0);
    let span_y = (params.region.size.height - size).max(0.0);
    let min_gap = size + params.padding;
    let attempts = params.max_attempts.max(1);

    let mut positions: Vec<Point> = Vec::with_capacity(count);
    let mut degraded = 0;
    for _ in 0..count {
        let mut candidate = Point::new(min_x, min_y);
        let mut accepted = false;
        for _ in 0..attempts {
            candidate = Point::new(
                min_x + rng.random_range(0.0..=span_x),
                min_y + rng.random_range(0.0..=span_y),
            );
            if positions
                .iter()
                .all(|placed| positions_separated(*placed, candidate, min_gap))
            {
                accepted = true;
                break;
            }
        }
        if !accepted {
            degraded += 1;
        }
        positions.push(candidate);
    }
    if degraded > 0 {
        tracing::warn!(
            count,
            degraded,
            "scatter ran out of attempts, accepting overlapping positions"
        );
    } else {
        tracing::debug!(count, "scatter placed all pieces without overlap");
    }
    Ok(ScatterLayout {
        positions,
        degraded,
    })
}

pub fn count_overlaps(positions: &[Point], min_gap: f32) -> usize {
    let mut overlaps = 0;
    for (i, a) in positions.iter().enumerate() {
        for b in &positions[i + 1..] {
            if !positions_separated(*a, *b, min_gap) {
                overlaps += 1;
            }
        }
    }
    overlaps
}
