//! Time-sliced cooperative iteration.
//!
//! A [`ChunkedTask`] is a fixed number of small steps. A [`Job`] runs those
//! steps until the wall-clock slice is used up, then hands control back to
//! the host with the current progress. The host decides when to poll again:
//! an event loop, an async runtime, or the blocking [`run_chunked`] driver.
//! Nothing here spawns threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Time source for slice accounting.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Shared flag that stops a job at its next yield boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How long a job may run before yielding, and how long the blocking driver
/// pauses between slices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulePolicy {
    pub slice: Duration,
    pub pause: Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            slice: Duration::from_millis(30),
            pause: Duration::from_millis(1),
        }
    }
}

/// A unit of work split into `total_steps()` ordered steps.
pub trait ChunkedTask {
    type Output;

    fn total_steps(&self) -> usize;

    /// Perform step `index`. Steps are issued in order, each exactly once.
    fn step(&mut self, index: usize) -> Result<()>;

    /// Fraction of the work done once `completed` steps have run.
    fn progress(&self, completed: usize) -> f64 {
        match self.total_steps() {
            0 => 1.0,
            total => completed as f64 / total as f64,
        }
    }

    fn finish(self) -> Self::Output;
}

/// Outcome of one [`Job::poll`].
#[derive(Debug, PartialEq)]
pub enum Poll<T> {
    /// Slice used up; the fraction done so far.
    Pending(f64),
    Ready(T),
}

/// Resumable driver for a [`ChunkedTask`].
pub struct Job<T: ChunkedTask, C: Clock = SystemClock> {
    task: Option<T>,
    clock: C,
    slice: Duration,
    next: usize,
    total: usize,
    reported: f64,
    cancel: CancelToken,
}

impl<T: ChunkedTask> Job<T, SystemClock> {
    pub fn new(task: T, slice: Duration) -> Self {
        Self::with_clock(task, slice, SystemClock)
    }
}

impl<T: ChunkedTask, C: Clock> Job<T, C> {
    pub fn with_clock(task: T, slice: Duration, clock: C) -> Self {
        let total = task.total_steps();
        Self {
            task: Some(task),
            clock,
            slice,
            next: 0,
            total,
            reported: 0.0,
            cancel: CancelToken::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run steps until the slice expires or the task completes.
    ///
    /// At least one step runs per call while work remains. Reported fractions
    /// never decrease.
    pub fn poll(&mut self) -> Result<Poll<T::Output>> {
        if self.cancel.is_cancelled() {
            self.task = None;
            return Err(Error::Cancelled);
        }
        let task = self.task.as_mut().ok_or(Error::JobFinished)?;

        let started = self.clock.now();
        while self.next < self.total {
            task.step(self.next)?;
            self.next += 1;
            // The clock is only consulted after a step, so a zero slice or a
            // coarse clock still moves one step per poll.
            if self.next < self.total
                && self.clock.now().saturating_duration_since(started) > self.slice
            {
                if self.cancel.is_cancelled() {
                    self.task = None;
                    return Err(Error::Cancelled);
                }
                self.reported = self.reported.max(task.progress(self.next)).min(1.0);
                return Ok(Poll::Pending(self.reported));
            }
        }

        let task = self.task.take().ok_or(Error::JobFinished)?;
        self.reported = 1.0;
        Ok(Poll::Ready(task.finish()))
    }
}

/// Poll `job` to completion on the current thread, sleeping `pause` between
/// slices. `on_progress` sees each mid-run fraction and then exactly one 1.0.
pub fn drive<T, C, F>(mut job: Job<T, C>, pause: Duration, mut on_progress: F) -> Result<T::Output>
where
    T: ChunkedTask,
    C: Clock,
    F: FnMut(f64),
{
    loop {
        match job.poll()? {
            Poll::Pending(fraction) => {
                on_progress(fraction);
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }
            Poll::Ready(output) => {
                on_progress(1.0);
                return Ok(output);
            }
        }
    }
}

/// Blocking driver with the system clock.
pub fn run_chunked<T, F>(
    task: T,
    policy: &SchedulePolicy,
    cancel: &CancelToken,
    on_progress: F,
) -> Result<T::Output>
where
    T: ChunkedTask,
    F: FnMut(f64),
{
    let job = Job::new(task, policy.slice).with_cancel(cancel.clone());
    drive(job, policy.pause, on_progress)
}

/// Closure adapter: `total` calls of `step_fn(i)`.
pub struct StepFn<F> {
    total: usize,
    step_fn: F,
}

impl<F> StepFn<F>
where
    F: FnMut(usize) -> Result<()>,
{
    pub fn new(total: usize, step_fn: F) -> Self {
        Self { total, step_fn }
    }
}

impl<F> ChunkedTask for StepFn<F>
where
    F: FnMut(usize) -> Result<()>,
{
    type Output = ();

    fn total_steps(&self) -> usize {
        self.total
    }

    fn step(&mut self, index: usize) -> Result<()> {
        (self.step_fn)(index)
    }

    fn finish(self) {}
}

/// Run `step_fn` for `0..total` in time slices.
pub fn run_steps<S, F>(total: usize, step_fn: S, policy: &SchedulePolicy, on_progress: F) -> Result<()>
where
    S: FnMut(usize) -> Result<()>,
    F: FnMut(f64),
{
    run_chunked(StepFn::new(total, step_fn), policy, &CancelToken::default(), on_progress)
}
