//! Worker scaling policy
//!
//! Pure decisions over a snapshot of a pool's counters, kept apart from the
//! threads that act on them.

/// Snapshot of the counters the policy looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerCounts {
    /// Live worker threads
    pub workers: usize,
    /// Workers not sleeping on the pool condvar
    pub busy: usize,
    /// Worker floor
    pub min: usize,
    /// Worker ceiling
    pub max: usize,
    /// Objects bound to the pool
    pub objects: usize,
}

/// What a submit should do to get its object serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitAction {
    /// Every worker is busy and the ceiling allows another one
    Spawn,
    /// Wake an idle worker (or let a busy one pick it up later)
    Wake,
}

/// Grow while every worker is busy and the ceiling is not reached
pub fn on_submit(counts: &WorkerCounts) -> SubmitAction {
    if counts.busy >= counts.workers && counts.workers < counts.max {
        SubmitAction::Spawn
    } else {
        SubmitAction::Wake
    }
}

/// Whether a worker whose idle wait ended should exit
///
/// Only after a timeout with no queued work. It leaves if the pool has more
/// workers than `max(min, 1)`, or if nothing keeps the pool in use at all.
pub fn should_retire(counts: &WorkerCounts, timed_out: bool, queue_empty: bool) -> bool {
    if !timed_out || !queue_empty {
        return false;
    }
    counts.workers > counts.min.max(1) || (counts.min == 0 && counts.objects == 0)
}

/// Outcome of a callback announcing that it will block for long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongRunAction {
    /// Idle workers remain; nothing to do
    Nothing,
    /// Add a replacement worker
    Spawn,
    /// Every worker is busy and the ceiling is reached
    TooManyThreads,
}

/// Decide how to keep the pool responsive while one worker blocks
pub fn on_long_run(counts: &WorkerCounts) -> LongRunAction {
    if counts.busy < counts.workers {
        LongRunAction::Nothing
    } else if counts.workers < counts.max {
        LongRunAction::Spawn
    } else {
        LongRunAction::TooManyThreads
    }
}
