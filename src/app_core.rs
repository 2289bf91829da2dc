use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use barabara_core::protocol::{
    piece_url, ArchiveUpload, DownloadArchiveResponse, ImageUpload, LoadArchiveRequest,
    ReconstructRequest, SplitRequest,
};
use barabara_core::{
    grid_targets, scatter_layout, service_targets, AnimationScheduler, ConfigError,
    EngineConfig, EngineError, FrameOutcome, FrameRequester, FrameSnapshot, Generation, Phase,
    PieceIndex, PieceModel, PieceRef, PieceSet, PlacementData, Point, PuzzleService, Size,
    TargetSource, ViewTargets,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::runtime::Clock;

pub type SessionSubscriber = Rc<dyn Fn(&SessionSnapshot)>;

/// Everything a view needs for one render.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub frame: Arc<FrameSnapshot>,
    pub pieces: Arc<PieceSet>,
    pub order: Vec<PieceIndex>,
    pub viewport: Size,
    pub result_ref: Option<String>,
    pub cache_token: u64,
}

impl SessionSnapshot {
    pub fn piece_url(&self, index: PieceIndex) -> Option<String> {
        let token = self.cache_token.to_string();
        self.pieces
            .get(index)
            .map(|piece| piece_url(&piece.source_ref, Some(&token)))
    }
}

/// Single-viewer puzzle session: the piece model, the animation scheduler
/// and the service they talk to.
pub struct PuzzleSession<S, R> {
    service: S,
    config: EngineConfig,
    model: PieceModel,
    scheduler: AnimationScheduler<R>,
    rng: StdRng,
    clock: Box<dyn Clock>,
    result_ref: Option<String>,
    cache_token: u64,
    targets_ready: bool,
    subscribers: Rc<RefCell<Vec<SessionSubscriber>>>,
}

impl<S: PuzzleService, R: FrameRequester> PuzzleSession<S, R> {
    pub fn new(
        service: S,
        requester: R,
        clock: Box<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        let scheduler = AnimationScheduler::new(requester, config.scheduler_settings());
        tracing::debug!(
            viewport_w = config.viewport.width,
            viewport_h = config.viewport.height,
            targets = ?config.target_source,
            "session created"
        );
        Ok(Self {
            service,
            config,
            model: PieceModel::new(),
            scheduler,
            rng,
            clock,
            result_ref: None,
            cache_token: 0,
            targets_ready: false,
            subscribers: Rc::new(RefCell::new(Vec::new())),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &PieceModel {
        &self.model
    }

    pub fn scheduler(&self) -> &AnimationScheduler<R> {
        &self.scheduler
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn generation(&self) -> Generation {
        self.scheduler.generation()
    }

    pub fn result_ref(&self) -> Option<&str> {
        self.result_ref.as_deref()
    }

    pub fn current_order(&self) -> Vec<&PieceRef> {
        self.model.current_order()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            frame: self.scheduler.snapshot(),
            pieces: self.model.pieces(),
            order: self.model.order().to_vec(),
            viewport: self.config.viewport,
            result_ref: self.result_ref.clone(),
            cache_token: self.cache_token,
        }
    }

    pub fn subscribe(&self, subscriber: SessionSubscriber) -> SessionSubscription {
        self.subscribers.borrow_mut().push(subscriber.clone());
        SessionSubscription {
            subscriber,
            subscribers: Rc::clone(&self.subscribers),
        }
    }

    /// Splits an uploaded image and scatters the new pieces.
    pub async fn shatter(&mut self, image: ImageUpload) -> Result<Generation, EngineError> {
        let request = SplitRequest {
            image,
            piece_count: self.config.piece_count,
        };
        let response = match self.service.split(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.abort(err.into())),
        };
        tracing::info!(
            runtime_secs = response.runtime_secs,
            pieces = response.pieces.len(),
            "split complete"
        );
        let result = self.install_pieces(response.pieces, Some(response.image_size));
        self.finish(result)
    }

    /// Loads pieces from a previously downloaded archive and scatters them.
    pub async fn load_archive(&mut self, archive: ArchiveUpload) -> Result<Generation, EngineError> {
        let request = LoadArchiveRequest {
            archive,
            piece_count: self.config.piece_count,
        };
        let response = match self.service.load_from_archive(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.abort(err.into())),
        };
        tracing::info!(
            runtime_secs = response.runtime_secs,
            pieces = response.pieces.len(),
            "archive loaded"
        );
        let result = self.install_pieces(response.pieces, None);
        self.finish(result)
    }

    pub async fn download_archive(&mut self) -> Result<DownloadArchiveResponse, EngineError> {
        let response = self.service.download_archive().await?;
        tracing::debug!(entries = response.entries.len(), "archive ready");
        Ok(response)
    }

    /// Local Fisher-Yates over the display order.
    pub fn shuffle(&mut self) {
        self.model.shuffle(&mut self.rng);
        self.notify();
    }

    /// Replaces the display order with one chosen by the service.
    pub async fn shuffle_remote(&mut self) -> Result<(), EngineError> {
        let response = match self.service.shuffle().await {
            Ok(response) => response,
            Err(err) => return Err(self.abort(err.into())),
        };
        tracing::info!(runtime_secs = response.runtime_secs, "shuffle complete");
        if let Err(err) = self.model.apply_service_order(&response.pieces) {
            return Err(self.abort(err));
        }
        self.notify();
        Ok(())
    }

    /// Submits the current order for reconstruction and animates the pieces
    /// toward the result. Without pieces this does nothing.
    pub async fn rebuild(&mut self) -> Result<Option<Generation>, EngineError> {
        if self.model.is_empty() {
            tracing::debug!("rebuild without pieces ignored");
            return Ok(None);
        }
        let request = ReconstructRequest {
            order: self.model.to_service_order(),
        };
        let response = match self.service.reconstruct(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.abort(err.into())),
        };
        tracing::info!(
            runtime_secs = response.runtime_secs,
            result = %response.result_ref,
            "reconstruct complete"
        );
        let result = self.begin_reconstruct(response.placement, response.result_ref);
        self.finish(result).map(Some)
    }

    /// `Scattered -> Moving` when the run has known targets.
    pub fn start(&mut self) -> Option<Generation> {
        if !self.targets_ready {
            tracing::debug!("start without targets ignored");
            return None;
        }
        let generation = self.scheduler.start(self.clock.now_ms())?;
        self.notify();
        Some(generation)
    }

    pub fn replay(&mut self) -> Option<Generation> {
        let generation = self.scheduler.replay(self.clock.now_ms())?;
        self.notify();
        Some(generation)
    }

    /// Drops placement data and scatters the current pieces afresh,
    /// superseding any run in flight.
    pub fn reset(&mut self) -> Result<Generation, EngineError> {
        self.model.clear_placement();
        self.result_ref = None;
        if self.model.is_empty() {
            self.targets_ready = false;
            let generation = self.scheduler.cancel();
            self.notify();
            return Ok(generation);
        }
        let result = self.rescatter();
        self.finish(result)
    }

    pub fn cancel(&mut self) -> Generation {
        let generation = self.scheduler.cancel();
        self.notify();
        generation
    }

    pub fn on_frame(&mut self, generation: Generation) -> FrameOutcome {
        let outcome = self.scheduler.on_frame(generation, self.clock.now_ms());
        match outcome {
            FrameOutcome::Completed => {
                let frame = self.scheduler.snapshot();
                if let Err(err) = self.model.settle(&frame.positions) {
                    self.abort(err);
                    return outcome;
                }
                self.notify();
            }
            FrameOutcome::Committed { .. } => self.notify(),
            FrameOutcome::Buffered { .. } | FrameOutcome::Stale { .. } | FrameOutcome::Idle => {}
        }
        outcome
    }

    pub fn piece_url(&self, index: PieceIndex) -> Option<String> {
        let token = self.cache_token.to_string();
        self.model
            .pieces()
            .get(index)
            .map(|piece| piece_url(&piece.source_ref, Some(&token)))
    }

    fn install_pieces(
        &mut self,
        ids: Vec<PieceRef>,
        image_size: Option<Size>,
    ) -> Result<Generation, EngineError> {
        if ids.len() != self.config.piece_count {
            return Err(EngineError::CountMismatch {
                expected: self.config.piece_count,
                found: ids.len(),
            });
        }
        let layout = scatter_layout(ids.len(), &self.config.scatter_params(), &mut self.rng)?;
        let targets = self.local_targets(ids.len(), image_size, None)?;
        self.model.replace_pieces(ids, image_size, &layout.positions)?;
        self.cache_token += 1;
        self.result_ref = None;
        self.arm_scattered(layout.positions, targets)
    }

    fn rescatter(&mut self) -> Result<Generation, EngineError> {
        let count = self.model.len();
        let layout = scatter_layout(count, &self.config.scatter_params(), &mut self.rng)?;
        let image_size = self.model.pieces().image_size;
        let targets = self.local_targets(count, image_size, None)?;
        self.model.reposition(&layout.positions, &layout.positions)?;
        self.arm_scattered(layout.positions, targets)
    }

    /// Puts a fresh scatter on screen. Under grid targets the run is ready to
    /// start; otherwise it waits for placement from the service.
    fn arm_scattered(
        &mut self,
        scattered: Vec<Point>,
        targets: Option<ViewTargets>,
    ) -> Result<Generation, EngineError> {
        let size = self.config.scatter_size();
        self.targets_ready = targets.is_some();
        let (target, target_size) = match targets {
            Some(targets) => (targets.positions, targets.piece_size),
            None => (scattered.clone(), size),
        };
        self.scheduler.scatter(scattered, size, target, target_size)
    }

    fn begin_reconstruct(
        &mut self,
        placement: PlacementData,
        result_ref: String,
    ) -> Result<Generation, EngineError> {
        let pieces = self.model.pieces();
        let targets = match self.config.target_source {
            TargetSource::Service => service_targets(&placement, &pieces, self.config.viewport)?,
            TargetSource::Grid => {
                let submitted = self.model.to_service_order();
                placement.resolve(&submitted)?;
                self.local_targets(pieces.len(), pieces.image_size, Some(&placement))?
                    .ok_or_else(|| EngineError::InvalidGeometry {
                        what: "no grid targets for pieces".to_string(),
                    })?
            }
        };
        let scattered = pieces.scattered_positions();
        self.model.reposition(&scattered, &targets.positions)?;
        self.model.set_placement(placement);
        self.result_ref = Some(result_ref);
        let generation = self.scheduler.scatter(
            scattered,
            self.config.scatter_size(),
            targets.positions,
            targets.piece_size,
        )?;
        self.targets_ready = true;
        self.scheduler.start(self.clock.now_ms());
        Ok(generation)
    }

    /// Grid targets when the grid strategy is active. The grid is laid over
    /// the source image, the placement canvas, or the viewport, whichever is
    /// known first.
    fn local_targets(
        &self,
        count: usize,
        image_size: Option<Size>,
        placement: Option<&PlacementData>,
    ) -> Result<Option<ViewTargets>, EngineError> {
        if self.config.target_source != TargetSource::Grid {
            return Ok(None);
        }
        let source = image_size
            .or_else(|| placement.map(|placement| placement.canvas_size))
            .unwrap_or(self.config.viewport);
        let grid = self
            .config
            .grid_for(count, source)
            .ok_or_else(|| EngineError::InvalidGeometry {
                what: format!("no grid holds {count} pieces"),
            })?;
        grid_targets(grid, source, count, self.config.viewport).map(Some)
    }

    fn finish(&mut self, result: Result<Generation, EngineError>) -> Result<Generation, EngineError> {
        match result {
            Ok(generation) => {
                self.notify();
                Ok(generation)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    fn abort(&mut self, err: EngineError) -> EngineError {
        tracing::warn!(%err, "operation failed, session idle");
        self.scheduler.cancel();
        self.notify();
        err
    }

    fn notify(&self) {
        let subscribers = self.subscribers.borrow().clone();
        if subscribers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }
    }
}

pub struct SessionSubscription {
    subscriber: SessionSubscriber,
    subscribers: Rc<RefCell<Vec<SessionSubscriber>>>,
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|item| !Rc::ptr_eq(item, &self.subscriber));
    }
}
