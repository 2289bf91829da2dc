use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::geometry::{FitTransform, Point, Size};
use crate::order::{PieceRef, PieceSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacedPiece {
    pub id: PieceRef,
    pub final_position: Point,
}

/// Final layout reported by the reconstruction service, in canvas space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementData {
    pub canvas_size: Size,
    pub piece_size: Size,
    pub pieces: Vec<PlacedPiece>,
}

impl PlacementData {
    /// Final positions for every submitted identifier, keyed by identifier.
    /// Entries for identifiers that were not submitted are dropped.
    pub fn resolve(&self, submitted: &[PieceRef]) -> Result<HashMap<PieceRef, Point>, EngineError> {
        let mut by_id: HashMap<&PieceRef, Point> = HashMap::with_capacity(self.pieces.len());
        for entry in &self.pieces {
            if by_id.contains_key(&entry.id) {
                tracing::warn!(id = %entry.id, "placement lists piece twice, keeping first");
                continue;
            }
            by_id.insert(&entry.id, entry.final_position);
        }
        let mut resolved = HashMap::with_capacity(submitted.len());
        let mut missing = Vec::new();
        for id in submitted {
            match by_id.remove(id) {
                Some(pos) => {
                    resolved.insert(id.clone(), pos);
                }
                None => missing.push(id.to_string()),
            }
        }
        if !by_id.is_empty() {
            tracing::warn!(extra = by_id.len(), "placement names pieces that were not submitted");
        }
        if !missing.is_empty() {
            return Err(EngineError::IncompletePlacement {
                expected: submitted.len(),
                missing,
            });
        }
        Ok(resolved)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub cols: u32,
    pub rows: u32,
}

impl GridSpec {
    pub fn new(cols: u32, rows: u32) -> Self {
        Self { cols, rows }
    }

    pub fn count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    pub fn cell_of(&self, index: usize) -> (u32, u32) {
        let cols = self.cols.max(1) as usize;
        ((index % cols) as u32, (index / cols) as u32)
    }

    /// Exact factorization of `count` whose pieces come closest to square for
    /// an image of the given size.
    pub fn for_count(count: usize, image: Size) -> Option<GridSpec> {
        if count == 0 || !image.is_positive() {
            return None;
        }
        let aspect = image.width / image.height;
        let mut best: Option<(GridSpec, f32)> = None;
        for rows in 1..=count {
            if count % rows != 0 {
                continue;
            }
            let cols = count / rows;
            let grid_ratio = cols as f32 / rows as f32;
            let piece_ratio = aspect / grid_ratio;
            let score = piece_ratio.ln().powi(2);
            let choice = GridSpec::new(cols as u32, rows as u32);
            match &best {
                Some((_, best_score)) if score >= *best_score => {}
                _ => best = Some((choice, score)),
            }
        }
        best.map(|(choice, _)| choice)
    }
}

/// Target positions and on-screen piece size, in viewport space.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewTargets {
    pub positions: Vec<Point>,
    pub piece_size: Size,
}

/// Targets taken from service placement: canvas positions fitted into the
/// viewport, ordered by piece index.
pub fn service_targets(
    placement: &PlacementData,
    pieces: &PieceSet,
    viewport: Size,
) -> Result<ViewTargets, EngineError> {
    let fit = FitTransform::fit(placement.canvas_size, viewport)?;
    let submitted: Vec<PieceRef> = pieces
        .pieces
        .iter()
        .map(|piece| piece.source_ref.clone())
        .collect();
    let resolved = placement.resolve(&submitted)?;
    let mut positions = Vec::with_capacity(submitted.len());
    for id in &submitted {
        let canvas = resolved
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::UnknownPiece { id: id.to_string() })?;
        positions.push(fit.apply(canvas));
    }
    Ok(ViewTargets {
        positions,
        piece_size: fit.apply_size(placement.piece_size),
    })
}

/// Targets from grid math alone: piece `i` goes to cell `i` of `grid` laid
/// over `source`, then the whole grid is fitted into the viewport.
pub fn grid_targets(
    grid: GridSpec,
    source: Size,
    count: usize,
    viewport: Size,
) -> Result<ViewTargets, EngineError> {
    if grid.count() != count {
        return Err(EngineError::CountMismatch {
            expected: grid.count(),
            found: count,
        });
    }
    let fit = FitTransform::fit(source, viewport)?;
    let cell = Size::new(
        source.width / grid.cols as f32,
        source.height / grid.rows as f32,
    );
    let positions = (0..count)
        .map(|index| {
            let (col, row) = grid.cell_of(index);
            fit.apply(Point::new(col as f32 * cell.width, row as f32 * cell.height))
        })
        .collect();
    Ok(ViewTargets {
        positions,
        piece_size: fit.apply_size(cell),
    })
}
