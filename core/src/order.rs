use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::geometry::{Point, Size};
use crate::placement::PlacementData;

pub type PieceIndex = usize;

/// Opaque identifier the reconstruction service uses for a piece.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceRef(String);

impl PieceRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PieceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PieceRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Piece {
    pub index: PieceIndex,
    pub source_ref: PieceRef,
    pub scattered_position: Point,
    pub final_position: Point,
    pub current_position: Point,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PieceSet {
    pub pieces: Vec<Piece>,
    /// Source image size, when the service reported one.
    pub image_size: Option<Size>,
    by_ref: HashMap<PieceRef, PieceIndex>,
}

impl PieceSet {
    fn build(pieces: Vec<Piece>, image_size: Option<Size>) -> Self {
        let by_ref = pieces
            .iter()
            .map(|piece| (piece.source_ref.clone(), piece.index))
            .collect();
        Self {
            pieces,
            image_size,
            by_ref,
        }
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn get(&self, index: PieceIndex) -> Option<&Piece> {
        self.pieces.get(index)
    }

    pub fn index_of(&self, id: &PieceRef) -> Option<PieceIndex> {
        self.by_ref.get(id).copied()
    }

    pub fn scattered_positions(&self) -> Vec<Point> {
        self.pieces.iter().map(|piece| piece.scattered_position).collect()
    }

}

/// Owner of the canonical piece list, the display permutation and the
/// latest placement received from the service. The piece list is replaced
/// as a whole, never edited in place.
#[derive(Clone, Debug)]
pub struct PieceModel {
    pieces: Arc<PieceSet>,
    order: Vec<PieceIndex>,
    placement: Option<Arc<PlacementData>>,
}

impl Default for PieceModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceModel {
    pub fn new() -> Self {
        Self {
            pieces: Arc::new(PieceSet::build(Vec::new(), None)),
            order: Vec::new(),
            placement: None,
        }
    }

    /// Installs a new piece set. Indices follow the identifier order, and the
    /// display order starts as the identity permutation.
    pub fn replace_pieces(
        &mut self,
        ids: Vec<PieceRef>,
        image_size: Option<Size>,
        scattered: &[Point],
    ) -> Result<(), EngineError> {
        if scattered.len() != ids.len() {
            return Err(EngineError::CountMismatch {
                expected: ids.len(),
                found: scattered.len(),
            });
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if !seen.insert(id) {
                return Err(EngineError::DuplicatePiece { id: id.to_string() });
            }
        }
        let pieces = ids
            .into_iter()
            .zip(scattered.iter().copied())
            .enumerate()
            .map(|(index, (source_ref, pos))| Piece {
                index,
                source_ref,
                scattered_position: pos,
                final_position: pos,
                current_position: pos,
            })
            .collect::<Vec<_>>();
        self.order = (0..pieces.len()).collect();
        self.pieces = Arc::new(PieceSet::build(pieces, image_size));
        self.placement = None;
        Ok(())
    }

    pub fn pieces(&self) -> Arc<PieceSet> {
        Arc::clone(&self.pieces)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn order(&self) -> &[PieceIndex] {
        &self.order
    }

    /// Fisher-Yates, walking from the last slot down and swapping each slot
    /// with a uniformly chosen slot at or before it.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        shuffle_in_place(&mut self.order, rng);
        tracing::debug!(pieces = self.order.len(), "shuffled display order");
    }

    pub fn current_order(&self) -> Vec<&PieceRef> {
        self.order
            .iter()
            .filter_map(|index| self.pieces.get(*index))
            .map(|piece| &piece.source_ref)
            .collect()
    }

    pub fn to_service_order(&self) -> Vec<PieceRef> {
        self.current_order().into_iter().cloned().collect()
    }

    /// Overwrites the display order with one reported by the service. The
    /// reported order must name every known piece exactly once.
    pub fn apply_service_order(&mut self, ids: &[PieceRef]) -> Result<(), EngineError> {
        if ids.len() != self.pieces.len() {
            return Err(EngineError::CountMismatch {
                expected: self.pieces.len(),
                found: ids.len(),
            });
        }
        let mut seen = vec![false; self.pieces.len()];
        let mut order = Vec::with_capacity(ids.len());
        for id in ids {
            let index = self
                .pieces
                .index_of(id)
                .ok_or_else(|| EngineError::UnknownPiece { id: id.to_string() })?;
            if std::mem::replace(&mut seen[index], true) {
                return Err(EngineError::DuplicatePiece { id: id.to_string() });
            }
            order.push(index);
        }
        self.order = order;
        Ok(())
    }

    pub fn placement(&self) -> Option<Arc<PlacementData>> {
        self.placement.clone()
    }

    pub fn set_placement(&mut self, placement: PlacementData) -> Arc<PlacementData> {
        let placement = Arc::new(placement);
        self.placement = Some(Arc::clone(&placement));
        placement
    }

    pub fn clear_placement(&mut self) {
        self.placement = None;
    }

    /// Replaces the piece list with one carrying new scattered and final
    /// positions. Current positions restart at the scattered ones.
    pub fn reposition(&mut self, scattered: &[Point], finals: &[Point]) -> Result<(), EngineError> {
        let total = self.pieces.len();
        if scattered.len() != total || finals.len() != total {
            return Err(EngineError::CountMismatch {
                expected: total,
                found: scattered.len().min(finals.len()),
            });
        }
        let pieces = self
            .pieces
            .pieces
            .iter()
            .zip(scattered.iter().zip(finals.iter()))
            .map(|(piece, (scattered, fin))| Piece {
                scattered_position: *scattered,
                final_position: *fin,
                current_position: *scattered,
                ..piece.clone()
            })
            .collect();
        self.pieces = Arc::new(PieceSet::build(pieces, self.pieces.image_size));
        Ok(())
    }

    /// Records where pieces came to rest after a run.
    pub fn settle(&mut self, current: &[Point]) -> Result<(), EngineError> {
        if current.len() != self.pieces.len() {
            return Err(EngineError::CountMismatch {
                expected: self.pieces.len(),
                found: current.len(),
            });
        }
        let pieces = self
            .pieces
            .pieces
            .iter()
            .zip(current.iter())
            .map(|(piece, pos)| Piece {
                current_position: *pos,
                ..piece.clone()
            })
            .collect();
        self.pieces = Arc::new(PieceSet::build(pieces, self.pieces.image_size));
        Ok(())
    }
}

pub fn shuffle_in_place<T, R: Rng>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}
