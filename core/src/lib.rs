pub mod animation;
pub mod config;
pub mod error;
pub mod geometry;
pub mod order;
pub mod placement;
pub mod protocol;
pub mod scatter;
pub mod scheduler;
pub mod service;

pub use animation::{ease_out_cubic, progress, AnimationRun, FrameSnapshot, Generation, Phase};
pub use config::{ConfigError, EngineConfig, ScatterConfig, TargetSource};
pub use error::EngineError;
pub use geometry::{fit_scale, lerp, FitTransform, Point, Rect, Size};
pub use order::{Piece, PieceIndex, PieceModel, PieceRef, PieceSet};
pub use placement::{grid_targets, service_targets, GridSpec, PlacedPiece, PlacementData, ViewTargets};
pub use scatter::{scatter_layout, ScatterLayout, ScatterParams};
pub use scheduler::{AnimationScheduler, FrameOutcome, FrameRequester, SchedulerSettings};
pub use service::{LocalPuzzleService, PuzzleService, ServiceError};
