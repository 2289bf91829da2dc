use std::sync::Arc;

use crate::animation::{ease_out_cubic, AnimationRun, FrameSnapshot, Generation, Phase};
use crate::error::EngineError;
use crate::geometry::{lerp_point, lerp_size, Point, Size};

pub trait FrameRequester {
    /// Ask for one frame callback for `generation`. Never blocks.
    fn request_frame(&mut self, generation: Generation);
    /// Drop any pending callback for `generation`.
    fn cancel(&mut self, generation: Generation);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub duration_ms: u32,
    pub start_delay_ms: u32,
    pub commit_every: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            duration_ms: 1200,
            start_delay_ms: 50,
            commit_every: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameOutcome {
    /// Working buffer advanced, snapshot left alone.
    Buffered { progress: f32 },
    /// Working buffer advanced and published.
    Committed { progress: f32 },
    /// Final exact frame published; no further frames requested.
    Completed,
    /// Callback belonged to a superseded run.
    Stale { generation: Generation, current: Generation },
    /// Nothing is moving.
    Idle,
}

/// Owns at most one run. Frames for any other generation publish nothing;
/// the published snapshot is replaced every `commit_every` frames and always
/// on completion.
pub struct AnimationScheduler<R> {
    requester: R,
    settings: SchedulerSettings,
    generation: Generation,
    run: Option<AnimationRun>,
    working: Vec<Point>,
    working_size: Size,
    frames: u64,
    published: Arc<FrameSnapshot>,
}

impl<R: FrameRequester> AnimationScheduler<R> {
    pub fn new(requester: R, settings: SchedulerSettings) -> Self {
        Self {
            requester,
            settings,
            generation: Generation::ZERO,
            run: None,
            working: Vec::new(),
            working_size: Size::default(),
            frames: 0,
            published: Arc::new(FrameSnapshot::empty()),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn phase(&self) -> Phase {
        self.run.as_ref().map_or(Phase::Idle, |run| run.phase)
    }

    pub fn run(&self) -> Option<&AnimationRun> {
        self.run.as_ref()
    }

    /// Frame-accurate positions, including frames not yet published.
    pub fn working(&self) -> &[Point] {
        &self.working
    }

    pub fn snapshot(&self) -> Arc<FrameSnapshot> {
        Arc::clone(&self.published)
    }

    pub fn requester(&self) -> &R {
        &self.requester
    }

    pub fn requester_mut(&mut self) -> &mut R {
        &mut self.requester
    }

    /// Installs a new run in `Scattered`, superseding any previous run, and
    /// publishes the scattered positions right away.
    pub fn scatter(
        &mut self,
        source: Vec<Point>,
        source_size: Size,
        target: Vec<Point>,
        target_size: Size,
    ) -> Result<Generation, EngineError> {
        if source.len() != target.len() {
            return Err(EngineError::CountMismatch {
                expected: source.len(),
                found: target.len(),
            });
        }
        let generation = self.advance_generation();
        self.working.clone_from(&source);
        self.working_size = source_size;
        self.frames = 0;
        self.run = Some(AnimationRun::new(
            generation,
            self.settings.duration_ms,
            source,
            source_size,
            target,
            target_size,
        ));
        self.publish(0.0);
        tracing::debug!(%generation, pieces = self.working.len(), "run scattered");
        Ok(generation)
    }

    /// `Scattered -> Moving`. Without a scattered run this does nothing.
    pub fn start(&mut self, now_ms: f64) -> Option<Generation> {
        let delay = f64::from(self.settings.start_delay_ms);
        let run = self.run.as_mut()?;
        if run.phase != Phase::Scattered {
            tracing::trace!(phase = ?run.phase, "start ignored");
            return None;
        }
        run.start_time_ms = Some(now_ms + delay);
        run.phase = Phase::Moving;
        let generation = run.generation;
        self.frames = 0;
        self.publish(0.0);
        self.requester.request_frame(generation);
        tracing::debug!(%generation, start_ms = now_ms + delay, "run started");
        Some(generation)
    }

    /// `Complete -> Moving` on the retained source and target, under a fresh
    /// generation.
    pub fn replay(&mut self, now_ms: f64) -> Option<Generation> {
        let phase = self.phase();
        if phase != Phase::Complete {
            tracing::trace!(?phase, "replay ignored");
            return None;
        }
        let generation = self.advance_generation();
        let delay = f64::from(self.settings.start_delay_ms);
        let run = self.run.as_mut()?;
        run.generation = generation;
        run.start_time_ms = Some(now_ms + delay);
        run.phase = Phase::Moving;
        run.last_progress = 0.0;
        self.working.clone_from(&run.source);
        self.working_size = run.source_size;
        self.frames = 0;
        self.publish(0.0);
        self.requester.request_frame(generation);
        tracing::debug!(%generation, "run replayed");
        Some(generation)
    }

    /// Any state to `Idle`. The last published positions stay visible.
    pub fn cancel(&mut self) -> Generation {
        let previous = self.generation;
        let generation = self.advance_generation();
        self.run = None;
        self.frames = 0;
        let mut snapshot = FrameSnapshot::clone(&self.published);
        snapshot.generation = generation;
        snapshot.phase = Phase::Idle;
        self.published = Arc::new(snapshot);
        tracing::debug!(%previous, %generation, "run cancelled");
        generation
    }

    pub fn ensure_current(&self, generation: Generation) -> Result<(), EngineError> {
        if generation == self.generation {
            Ok(())
        } else {
            Err(EngineError::StaleRunIgnored {
                generation: generation.value(),
                current: self.generation.value(),
            })
        }
    }

    pub fn on_frame(&mut self, generation: Generation, now_ms: f64) -> FrameOutcome {
        if let Err(err) = self.ensure_current(generation) {
            tracing::trace!(%err, "frame suppressed");
            return FrameOutcome::Stale {
                generation,
                current: self.generation,
            };
        }
        let Some(run) = self.run.as_mut() else {
            return FrameOutcome::Idle;
        };
        if run.phase != Phase::Moving {
            return FrameOutcome::Idle;
        }

        let progress = run.progress_at(now_ms);
        run.last_progress = progress;
        self.frames += 1;

        if progress >= 1.0 {
            run.phase = Phase::Complete;
            self.working.clone_from(&run.target);
            self.working_size = run.target_size;
            self.publish(1.0);
            tracing::debug!(%generation, frames = self.frames, "run complete");
            return FrameOutcome::Completed;
        }

        let eased = ease_out_cubic(progress);
        for ((slot, from), to) in self
            .working
            .iter_mut()
            .zip(run.source.iter())
            .zip(run.target.iter())
        {
            *slot = lerp_point(*from, *to, eased);
        }
        self.working_size = lerp_size(run.source_size, run.target_size, eased);
        tracing::trace!(%generation, progress, eased, "frame computed");

        let commit_every = u64::from(self.settings.commit_every.max(1));
        let outcome = if self.frames % commit_every == 0 {
            self.publish(progress);
            FrameOutcome::Committed { progress }
        } else {
            FrameOutcome::Buffered { progress }
        };
        self.requester.request_frame(generation);
        outcome
    }

    fn advance_generation(&mut self) -> Generation {
        let previous = self.generation;
        self.requester.cancel(previous);
        self.generation = previous.next();
        self.generation
    }

    fn publish(&mut self, progress: f32) {
        self.published = Arc::new(FrameSnapshot {
            generation: self.generation,
            phase: self.phase(),
            progress,
            positions: self.working.clone(),
            piece_size: self.working_size,
            frame: self.frames,
        });
    }
}
