use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use barabara_core::{FrameOutcome, FrameRequester, Generation, PuzzleService};

use crate::app_core::PuzzleSession;

/// Frame requests waiting for the next tick. Clones share one queue, so the
/// scheduler can hold one handle while the loop drains another.
#[derive(Clone, Default)]
pub struct FrameQueue {
    pending: Rc<RefCell<VecDeque<Generation>>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    fn take_due(&self) -> Vec<Generation> {
        self.pending.borrow_mut().drain(..).collect()
    }
}

impl FrameRequester for FrameQueue {
    fn request_frame(&mut self, generation: Generation) {
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(&generation) {
            pending.push_back(generation);
        }
    }

    fn cancel(&mut self, generation: Generation) {
        self.pending
            .borrow_mut()
            .retain(|pending| *pending != generation);
    }
}

/// Native stand-in for a display-frame callback. Each tick dispatches the
/// frames requested before it; frames requested during a tick wait for the
/// next one.
pub struct FrameLoop {
    queue: FrameQueue,
    ticks: u64,
    dispatched: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self {
            queue: FrameQueue::new(),
            ticks: 0,
            dispatched: 0,
        }
    }

    /// Handle to give to the scheduler.
    pub fn requester(&self) -> FrameQueue {
        self.queue.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn tick<S: PuzzleService>(
        &mut self,
        session: &mut PuzzleSession<S, FrameQueue>,
    ) -> Vec<FrameOutcome> {
        self.ticks += 1;
        let due = self.queue.take_due();
        self.dispatched += due.len() as u64;
        due.into_iter()
            .map(|generation| session.on_frame(generation))
            .collect()
    }
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}
