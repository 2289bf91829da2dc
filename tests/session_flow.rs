use std::cell::RefCell;
use std::rc::Rc;

use barabara::{
    FrameLoop, FrameQueue, ManualClock, PuzzleSession, PuzzleView, SessionSnapshot, SvgView,
};
use barabara_core::protocol::{
    ArchiveUpload, DownloadArchiveResponse, ImageUpload, LoadArchiveRequest,
    LoadArchiveResponse, ReconstructRequest, ReconstructResponse, ShuffleResponse, SplitRequest,
    SplitResponse,
};
use barabara_core::{
    service_targets, EngineConfig, EngineError, FrameOutcome, LocalPuzzleService, Phase, Point,
    PuzzleService, ServiceError, Size, TargetSource,
};

/// Local service whose reconstruct answer drops the last placement entry.
struct DroppingService {
    inner: LocalPuzzleService,
    drop_placement: bool,
}

impl PuzzleService for DroppingService {
    async fn split(&mut self, request: SplitRequest) -> Result<SplitResponse, ServiceError> {
        self.inner.split(request).await
    }

    async fn shuffle(&mut self) -> Result<ShuffleResponse, ServiceError> {
        self.inner.shuffle().await
    }

    async fn reconstruct(
        &mut self,
        request: ReconstructRequest,
    ) -> Result<ReconstructResponse, ServiceError> {
        let mut response = self.inner.reconstruct(request).await?;
        if self.drop_placement {
            response.placement.pieces.pop();
        }
        Ok(response)
    }

    async fn load_from_archive(
        &mut self,
        request: LoadArchiveRequest,
    ) -> Result<LoadArchiveResponse, ServiceError> {
        self.inner.load_from_archive(request).await
    }

    async fn download_archive(&mut self) -> Result<DownloadArchiveResponse, ServiceError> {
        self.inner.download_archive().await
    }
}

struct Harness<S> {
    session: PuzzleSession<S, FrameQueue>,
    frames: FrameLoop,
    clock: ManualClock,
}

impl<S: PuzzleService> Harness<S> {
    fn new(service: S, config: EngineConfig) -> Self {
        let frames = FrameLoop::new();
        let clock = ManualClock::new();
        let session = PuzzleSession::new(
            service,
            frames.requester(),
            Box::new(clock.clone()),
            config,
        )
        .unwrap();
        Self {
            session,
            frames,
            clock,
        }
    }

    fn tick(&mut self) -> Vec<FrameOutcome> {
        self.clock.advance(16.0);
        self.frames.tick(&mut self.session)
    }

    fn run_to_idle(&mut self) -> u64 {
        let mut ticks = 0;
        while !self.frames.is_idle() && ticks < 1_000 {
            self.tick();
            ticks += 1;
        }
        ticks
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        seed: Some(17),
        ..EngineConfig::default()
    }
}

fn upload(image_size: Size) -> ImageUpload {
    ImageUpload {
        file_name: "harbor.png".to_string(),
        image_size,
        bytes: Vec::new(),
    }
}

fn local() -> LocalPuzzleService {
    LocalPuzzleService::new(Some(17))
}

#[tokio::test]
async fn shatter_then_rebuild_lands_on_placement() {
    let mut harness = Harness::new(local(), config());
    harness
        .session
        .shatter(upload(Size::new(1600.0, 1200.0)))
        .await
        .unwrap();
    assert_eq!(harness.session.phase(), Phase::Scattered);
    assert_eq!(harness.session.model().len(), 50);
    assert_eq!(
        harness.session.piece_url(0).as_deref(),
        Some("/static/pieces/piece_00.png?v=1")
    );
    assert_eq!(harness.session.start(), None);

    harness.session.shuffle();
    harness.session.rebuild().await.unwrap().unwrap();
    assert_eq!(harness.session.phase(), Phase::Moving);
    assert_eq!(
        harness.session.result_ref(),
        Some("/static/rebuilt/rebuilt.png")
    );

    let ticks = harness.run_to_idle();
    assert!(ticks > 70 && ticks < 100, "took {ticks} ticks");
    assert_eq!(harness.session.phase(), Phase::Complete);

    let snapshot = harness.session.snapshot();
    assert_eq!(snapshot.frame.piece_size, Size::new(80.0, 120.0));
    let pieces = harness.session.model().pieces();
    let last = pieces.index_of(&"piece_49.png".into()).unwrap();
    assert_eq!(snapshot.frame.positions[last], Point::new(720.0, 480.0));
    for piece in &pieces.pieces {
        assert_eq!(piece.current_position, piece.final_position);
    }
}

#[tokio::test]
async fn incomplete_placement_leaves_session_idle() {
    let service = DroppingService {
        inner: local(),
        drop_placement: true,
    };
    let mut harness = Harness::new(service, config());
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    let before = harness.session.model().pieces();

    let err = harness.session.rebuild().await.unwrap_err();
    match err {
        EngineError::IncompletePlacement { expected, missing } => {
            assert_eq!(expected, 50);
            assert_eq!(missing.len(), 1);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(harness.session.phase(), Phase::Idle);
    assert!(harness.frames.is_idle());
    assert!(harness.session.model().placement().is_none());
    assert_eq!(harness.session.result_ref(), None);
    assert_eq!(*harness.session.model().pieces(), *before);
}

#[tokio::test]
async fn reset_mid_flight_silences_the_old_run() {
    let mut harness = Harness::new(local(), config());
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    let run_a = harness.session.rebuild().await.unwrap().unwrap();
    for _ in 0..10 {
        harness.tick();
    }
    assert_eq!(harness.session.phase(), Phase::Moving);

    let run_b = harness.session.reset().unwrap();
    assert!(run_b > run_a);
    assert_eq!(harness.session.phase(), Phase::Scattered);
    assert!(harness.frames.is_idle());
    let after_reset = harness.session.snapshot();

    harness.clock.advance(500.0);
    let outcome = harness.session.on_frame(run_a);
    assert!(matches!(outcome, FrameOutcome::Stale { .. }));
    let after_late_frame = harness.session.snapshot();
    assert_eq!(after_late_frame.frame, after_reset.frame);
    assert!(harness.session.model().placement().is_none());
}

#[tokio::test]
async fn replay_runs_again_under_a_new_generation() {
    let mut harness = Harness::new(local(), config());
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    let first = harness.session.rebuild().await.unwrap().unwrap();
    harness.run_to_idle();
    let landed = harness.session.snapshot().frame.positions.clone();

    let second = harness.session.replay().unwrap();
    assert!(second > first);
    assert_eq!(harness.session.phase(), Phase::Moving);
    harness.run_to_idle();
    assert_eq!(harness.session.phase(), Phase::Complete);
    assert_eq!(harness.session.snapshot().frame.positions, landed);
}

#[tokio::test]
async fn grid_strategy_can_start_without_the_service() {
    let config = EngineConfig {
        target_source: TargetSource::Grid,
        ..config()
    };
    let mut harness = Harness::new(local(), config);
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    for pos in &harness.session.snapshot().frame.positions {
        assert!(pos.x >= 0.0 && pos.x <= 800.0 - 48.0);
        assert!(pos.y >= 0.0 && pos.y <= 600.0 - 48.0);
    }
    harness.session.start().unwrap();
    harness.run_to_idle();
    let frame = harness.session.snapshot().frame;
    assert_eq!(frame.phase, Phase::Complete);
    assert_eq!(frame.positions[11], Point::new(80.0, 120.0));
    assert_eq!(frame.piece_size, Size::new(80.0, 120.0));
}

#[tokio::test]
async fn grid_targets_match_service_placement_past_two_digit_names() {
    let config = EngineConfig {
        piece_count: 120,
        target_source: TargetSource::Grid,
        ..config()
    };
    let mut harness = Harness::new(local(), config);
    harness
        .session
        .shatter(upload(Size::new(1200.0, 1000.0)))
        .await
        .unwrap();
    let pieces = harness.session.model().pieces();
    assert_eq!(pieces.index_of(&"piece_100.png".into()), Some(100));
    assert_eq!(pieces.index_of(&"piece_11.png".into()), Some(11));

    harness.session.rebuild().await.unwrap().unwrap();
    harness.run_to_idle();
    assert_eq!(harness.session.phase(), Phase::Complete);

    let placement = harness.session.model().placement().unwrap();
    let expected = service_targets(&placement, &pieces, harness.session.config().viewport)
        .unwrap()
        .positions;
    let landed = harness.session.snapshot().frame.positions.clone();
    for (index, (got, want)) in landed.iter().zip(expected.iter()).enumerate() {
        assert!(
            (got.x - want.x).abs() < 0.01 && (got.y - want.y).abs() < 0.01,
            "piece {index} landed at {got:?}, placement says {want:?}"
        );
    }
    assert!((landed[100].x - 280.0).abs() < 0.01);
    assert!((landed[100].y - 480.0).abs() < 0.01);
}

#[tokio::test]
async fn archive_with_wrong_count_keeps_previous_pieces() {
    let mut harness = Harness::new(local(), config());
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    let before = harness.session.model().pieces();
    let err = harness
        .session
        .load_archive(ArchiveUpload {
            file_name: "pieces.zip".to_string(),
            entries: vec!["piece_00.png".to_string(), "piece_01.png".to_string()],
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::CountMismatch {
            expected: 50,
            found: 2
        }
    ));
    assert_eq!(harness.session.phase(), Phase::Idle);
    assert_eq!(*harness.session.model().pieces(), *before);
}

#[tokio::test]
async fn archive_round_trip_reloads_the_same_pieces() {
    let mut harness = Harness::new(local(), config());
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    let archive = harness.session.download_archive().await.unwrap();
    assert_eq!(archive.file_name, "pieces.zip");
    let entries = archive
        .entries
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    harness
        .session
        .load_archive(ArchiveUpload {
            file_name: archive.file_name.clone(),
            entries,
        })
        .await
        .unwrap();
    assert_eq!(harness.session.model().len(), 50);
    assert_eq!(harness.session.phase(), Phase::Scattered);
    assert_eq!(
        harness.session.piece_url(0).as_deref(),
        Some("/static/pieces/piece_00.png?v=2")
    );
}

#[tokio::test]
async fn remote_shuffle_overwrites_local_order() {
    let mut harness = Harness::new(local(), config());
    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    harness.session.shuffle_remote().await.unwrap();
    let mut order = harness.session.model().order().to_vec();
    assert_ne!(order, (0..50).collect::<Vec<_>>());
    order.sort_unstable();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
}

#[tokio::test]
async fn rejected_upload_surfaces_service_error() {
    let mut harness = Harness::new(local(), config());
    let err = harness
        .session
        .shatter(ImageUpload {
            file_name: "harbor.jpg".to_string(),
            image_size: Size::new(800.0, 600.0),
            bytes: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Service(ServiceError::InvalidUpload { .. })
    ));
    assert_eq!(harness.session.phase(), Phase::Idle);
    assert!(harness.session.model().is_empty());
}

#[tokio::test]
async fn subscribed_view_sees_committed_frames() {
    let mut harness = Harness::new(local(), config());
    let view = Rc::new(RefCell::new(SvgView::new()));
    let sink = Rc::clone(&view);
    let _subscription = harness
        .session
        .subscribe(Rc::new(move |snapshot: &SessionSnapshot| {
            sink.borrow_mut().render(snapshot)
        }));

    harness
        .session
        .shatter(upload(Size::new(800.0, 600.0)))
        .await
        .unwrap();
    harness.session.rebuild().await.unwrap();
    let ticks = harness.run_to_idle();

    let view = view.borrow();
    assert!(view.renders() >= 2 + ticks / 3);
    assert!(view.renders() < 2 + ticks);
    let svg = view.last().unwrap();
    assert!(svg.contains(r#"data-phase="complete""#));
    assert_eq!(svg.matches("<image").count(), 50);
}
