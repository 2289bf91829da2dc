use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::geometry::{Point, Size};
use crate::order::{shuffle_in_place, PieceRef};
use crate::placement::{GridSpec, PlacedPiece, PlacementData};
use crate::protocol::{
    is_allowed_image, piece_file_name, piece_number, piece_ref_from_locator,
    DownloadArchiveResponse, LoadArchiveRequest, LoadArchiveResponse, ReconstructRequest,
    ReconstructResponse, ShuffleResponse, SplitRequest, SplitResponse, ARCHIVE_FILE_NAME,
    REBUILT_RESULT_REF,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid upload: {reason}")]
    InvalidUpload { reason: String },
    #[error("request rejected: {message}")]
    Rejected { message: String },
    #[error("service does not know piece {id}")]
    UnknownPiece { id: String },
    #[error("service unavailable: {reason}")]
    Unavailable { reason: String },
}

fn rejected(message: impl Into<String>) -> ServiceError {
    ServiceError::Rejected {
        message: message.into(),
    }
}

/// Boundary to the reconstruction service.
#[allow(async_fn_in_trait)]
pub trait PuzzleService {
    async fn split(&mut self, request: SplitRequest) -> Result<SplitResponse, ServiceError>;

    /// Authoritative new display order for the current pieces.
    async fn shuffle(&mut self) -> Result<ShuffleResponse, ServiceError>;

    async fn reconstruct(
        &mut self,
        request: ReconstructRequest,
    ) -> Result<ReconstructResponse, ServiceError>;

    async fn load_from_archive(
        &mut self,
        request: LoadArchiveRequest,
    ) -> Result<LoadArchiveResponse, ServiceError>;

    async fn download_archive(&mut self) -> Result<DownloadArchiveResponse, ServiceError>;
}

/// Image size assumed for archives, which carry no source image.
pub const NOMINAL_IMAGE_SIZE: Size = Size {
    width: 800.0,
    height: 600.0,
};

#[derive(Clone, Debug)]
struct LocalPuzzle {
    grid: GridSpec,
    image_size: Size,
    pieces: Vec<PieceRef>,
    cells: HashMap<PieceRef, usize>,
}

impl LocalPuzzle {
    /// `pieces` is in grid order: entry `i` belongs on cell `i`.
    fn new(grid: GridSpec, image_size: Size, pieces: Vec<PieceRef>) -> Self {
        let cells = pieces
            .iter()
            .enumerate()
            .map(|(cell, id)| (id.clone(), cell))
            .collect();
        Self {
            grid,
            image_size,
            pieces,
            cells,
        }
    }

    fn piece_size(&self) -> Size {
        Size::new(
            (self.image_size.width / self.grid.cols as f32).floor(),
            (self.image_size.height / self.grid.rows as f32).floor(),
        )
    }
}

/// In-process service. Splitting names pieces `piece_NN.png` in grid order,
/// and reconstruction puts every piece back on its own grid cell no matter
/// which order it was submitted in.
pub struct LocalPuzzleService {
    rng: StdRng,
    grid: Option<GridSpec>,
    puzzle: Option<LocalPuzzle>,
}

impl LocalPuzzleService {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rng,
            grid: None,
            puzzle: None,
        }
    }

    /// Fixed grid used whenever it holds the requested piece count.
    pub fn with_grid(mut self, grid: GridSpec) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn pieces(&self) -> &[PieceRef] {
        self.puzzle
            .as_ref()
            .map_or(&[][..], |puzzle| puzzle.pieces.as_slice())
    }

    pub fn grid(&self) -> Option<GridSpec> {
        self.puzzle.as_ref().map(|puzzle| puzzle.grid)
    }

    fn grid_for(&self, count: usize, image_size: Size) -> Result<GridSpec, ServiceError> {
        match self.grid {
            Some(grid) if grid.count() == count => Ok(grid),
            _ => GridSpec::for_count(count, image_size)
                .ok_or_else(|| rejected(format!("cannot split into {count} pieces"))),
        }
    }

    fn current(&self) -> Result<&LocalPuzzle, ServiceError> {
        self.puzzle
            .as_ref()
            .ok_or_else(|| rejected("no pieces loaded"))
    }
}

impl PuzzleService for LocalPuzzleService {
    async fn split(&mut self, request: SplitRequest) -> Result<SplitResponse, ServiceError> {
        let started = Instant::now();
        let image = request.image;
        if image.file_name.is_empty() {
            return Err(ServiceError::InvalidUpload {
                reason: "no selected file".to_string(),
            });
        }
        if !is_allowed_image(&image.file_name) {
            return Err(ServiceError::InvalidUpload {
                reason: format!("{} is not a png image", image.file_name),
            });
        }
        if !image.image_size.is_positive() {
            return Err(ServiceError::InvalidUpload {
                reason: format!(
                    "image size must be positive, got {}x{}",
                    image.image_size.width, image.image_size.height
                ),
            });
        }
        let grid = self.grid_for(request.piece_count, image.image_size)?;
        let pieces = (0..grid.count())
            .map(|cell| PieceRef::new(piece_file_name(cell)))
            .collect();
        let puzzle = LocalPuzzle::new(grid, image.image_size, pieces);
        let pieces = puzzle.pieces.clone();
        tracing::debug!(
            file = %image.file_name,
            cols = grid.cols,
            rows = grid.rows,
            "split image"
        );
        self.puzzle = Some(puzzle);
        Ok(SplitResponse {
            pieces,
            image_size: image.image_size,
            runtime_secs: started.elapsed().as_secs_f64(),
        })
    }

    async fn shuffle(&mut self) -> Result<ShuffleResponse, ServiceError> {
        let started = Instant::now();
        let mut pieces = self.current()?.pieces.clone();
        shuffle_in_place(&mut pieces, &mut self.rng);
        Ok(ShuffleResponse {
            pieces,
            runtime_secs: started.elapsed().as_secs_f64(),
        })
    }

    async fn reconstruct(
        &mut self,
        request: ReconstructRequest,
    ) -> Result<ReconstructResponse, ServiceError> {
        let started = Instant::now();
        let puzzle = self.current()?;
        if request.order.len() != puzzle.pieces.len() {
            return Err(rejected(format!(
                "order must be a list of {} piece filenames",
                puzzle.pieces.len()
            )));
        }
        let piece_size = puzzle.piece_size();
        let mut pieces = Vec::with_capacity(request.order.len());
        for submitted in &request.order {
            let id = piece_ref_from_locator(submitted.as_str());
            let cell = *puzzle
                .cells
                .get(&id)
                .ok_or_else(|| ServiceError::UnknownPiece { id: id.to_string() })?;
            let (col, row) = puzzle.grid.cell_of(cell);
            pieces.push(PlacedPiece {
                id,
                final_position: Point::new(
                    col as f32 * piece_size.width,
                    row as f32 * piece_size.height,
                ),
            });
        }
        let canvas_size = Size::new(
            puzzle.grid.cols as f32 * piece_size.width,
            puzzle.grid.rows as f32 * piece_size.height,
        );
        Ok(ReconstructResponse {
            result_ref: REBUILT_RESULT_REF.to_string(),
            placement: PlacementData {
                canvas_size,
                piece_size,
                pieces,
            },
            runtime_secs: started.elapsed().as_secs_f64(),
        })
    }

    async fn load_from_archive(
        &mut self,
        request: LoadArchiveRequest,
    ) -> Result<LoadArchiveResponse, ServiceError> {
        let started = Instant::now();
        let archive = request.archive;
        if !archive.file_name.to_ascii_lowercase().ends_with(".zip") {
            return Err(ServiceError::InvalidUpload {
                reason: format!("{} is not a zip archive", archive.file_name),
            });
        }
        let mut names: Vec<PieceRef> = archive
            .entries
            .iter()
            .map(|entry| piece_ref_from_locator(entry))
            .filter(|id| is_allowed_image(id.as_str()))
            .collect();
        // Numbered names first, by number, so piece_100 follows piece_99.
        names.sort_by(|a, b| {
            let key = |id: &PieceRef| piece_number(id.as_str()).unwrap_or(usize::MAX);
            key(a).cmp(&key(b)).then_with(|| a.cmp(b))
        });
        names.dedup();
        if names.is_empty() {
            return Err(ServiceError::InvalidUpload {
                reason: "archive holds no piece images".to_string(),
            });
        }
        let grid = self.grid_for(names.len(), NOMINAL_IMAGE_SIZE)?;
        let puzzle = LocalPuzzle::new(grid, NOMINAL_IMAGE_SIZE, names);
        let pieces = puzzle.pieces.clone();
        if pieces.len() != request.piece_count {
            tracing::warn!(
                expected = request.piece_count,
                found = pieces.len(),
                "archive piece count differs from request"
            );
        }
        self.puzzle = Some(puzzle);
        Ok(LoadArchiveResponse {
            pieces,
            runtime_secs: started.elapsed().as_secs_f64(),
        })
    }

    async fn download_archive(&mut self) -> Result<DownloadArchiveResponse, ServiceError> {
        let puzzle = self.current()?;
        Ok(DownloadArchiveResponse {
            file_name: ARCHIVE_FILE_NAME.to_string(),
            entries: puzzle.pieces.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ArchiveUpload, ImageUpload};

    fn split_request(file_name: &str, piece_count: usize) -> SplitRequest {
        SplitRequest {
            image: ImageUpload {
                file_name: file_name.to_string(),
                image_size: Size::new(1000.0, 600.0),
                bytes: Vec::new(),
            },
            piece_count,
        }
    }

    #[tokio::test]
    async fn split_names_pieces_in_grid_order() {
        let mut service = LocalPuzzleService::new(Some(1));
        let response = service.split(split_request("cat.png", 50)).await.unwrap();
        assert_eq!(response.pieces.len(), 50);
        assert_eq!(response.pieces[0].as_str(), "piece_00.png");
        assert_eq!(response.pieces[49].as_str(), "piece_49.png");
        assert_eq!(response.image_size, Size::new(1000.0, 600.0));
        assert_eq!(service.grid(), Some(GridSpec::new(10, 5)));
    }

    #[tokio::test]
    async fn split_rejects_non_png_and_empty_names() {
        let mut service = LocalPuzzleService::new(Some(1));
        let err = service.split(split_request("cat.jpg", 50)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUpload { .. }));
        let err = service.split(split_request("", 50)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUpload { .. }));
        assert!(service.pieces().is_empty());
    }

    #[tokio::test]
    async fn shuffle_returns_a_permutation() {
        let mut service = LocalPuzzleService::new(Some(9));
        let split = service.split(split_request("cat.png", 50)).await.unwrap();
        let mut shuffled = service.shuffle().await.unwrap().pieces;
        shuffled.sort();
        assert_eq!(shuffled, split.pieces);
    }

    #[tokio::test]
    async fn reconstruct_places_each_piece_on_its_cell() {
        let mut service = LocalPuzzleService::new(Some(2));
        service.split(split_request("cat.png", 50)).await.unwrap();
        let order = service.shuffle().await.unwrap().pieces;
        let response = service
            .reconstruct(ReconstructRequest {
                order: order.clone(),
            })
            .await
            .unwrap();
        assert_eq!(response.result_ref, "/static/rebuilt/rebuilt.png");
        let placement = response.placement;
        assert_eq!(placement.piece_size, Size::new(100.0, 120.0));
        assert_eq!(placement.canvas_size, Size::new(1000.0, 600.0));
        let ids: Vec<PieceRef> = placement.pieces.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, order);
        let twelve = placement
            .pieces
            .iter()
            .find(|p| p.id.as_str() == "piece_12.png")
            .unwrap();
        assert_eq!(twelve.final_position, Point::new(200.0, 120.0));
    }

    #[tokio::test]
    async fn reconstruct_enforces_the_order_contract() {
        let mut service = LocalPuzzleService::new(Some(2));
        let split = service.split(split_request("cat.png", 4)).await.unwrap();
        let err = service
            .reconstruct(ReconstructRequest {
                order: split.pieces[..3].to_vec(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));

        let mut order = split.pieces.clone();
        order[3] = PieceRef::from("piece_77.png");
        let err = service
            .reconstruct(ReconstructRequest { order })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnknownPiece { .. }));
    }

    #[tokio::test]
    async fn archive_entries_are_filtered_and_sorted() {
        let mut service = LocalPuzzleService::new(Some(3));
        let response = service
            .load_from_archive(LoadArchiveRequest {
                archive: ArchiveUpload {
                    file_name: "pieces.zip".to_string(),
                    entries: vec![
                        "piece_01.png".to_string(),
                        "notes.txt".to_string(),
                        "pieces/piece_00.png".to_string(),
                    ],
                },
                piece_count: 2,
            })
            .await
            .unwrap();
        assert_eq!(
            response.pieces,
            vec![PieceRef::from("piece_00.png"), PieceRef::from("piece_01.png")]
        );
        let download = service.download_archive().await.unwrap();
        assert_eq!(download.file_name, "pieces.zip");
        assert_eq!(download.entries, response.pieces);
    }

    #[tokio::test]
    async fn three_digit_pieces_keep_grid_order() {
        let mut service = LocalPuzzleService::new(Some(4));
        let split = service
            .split(split_request("cat.png", 120))
            .await
            .unwrap();
        assert_eq!(split.pieces[10].as_str(), "piece_10.png");
        assert_eq!(split.pieces[100].as_str(), "piece_100.png");

        let response = service
            .load_from_archive(LoadArchiveRequest {
                archive: ArchiveUpload {
                    file_name: "pieces.zip".to_string(),
                    entries: vec![
                        "piece_100.png".to_string(),
                        "piece_10.png".to_string(),
                        "piece_99.png".to_string(),
                        "piece_09.png".to_string(),
                    ],
                },
                piece_count: 4,
            })
            .await
            .unwrap();
        let names: Vec<&str> = response.pieces.iter().map(PieceRef::as_str).collect();
        assert_eq!(
            names,
            ["piece_09.png", "piece_10.png", "piece_99.png", "piece_100.png"]
        );
    }

    #[tokio::test]
    async fn calls_before_split_are_rejected() {
        let mut service = LocalPuzzleService::new(None);
        assert!(matches!(
            service.shuffle().await.unwrap_err(),
            ServiceError::Rejected { .. }
        ));
        assert!(matches!(
            service.download_archive().await.unwrap_err(),
            ServiceError::Rejected { .. }
        ));
    }
}
