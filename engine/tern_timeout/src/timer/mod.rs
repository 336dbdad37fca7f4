use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{TimedOut, TimeoutError};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TimeoutState {
    Disarmed,
    Armed,
    Fired,
}

#[derive(Debug, Default)]
struct Schedule {
    deadline: Option<Instant>,
    /// Bumped by every arm and disarm.
    generation: u64,
    budget: Duration,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Shared {
    fired: AtomicBool,
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

impl Shared {
    fn timed_out(&self) -> TimedOut {
        let budget = self.schedule.lock().budget;
        TimedOut {
            seconds: budget.as_secs() + u64::from(budget.subsec_nanos() > 0),
        }
    }
}

/// Cheap handle for polling the fired flag from another component.
#[derive(Clone, Debug)]
pub struct InterruptFlag(Arc<Shared>);

impl InterruptFlag {
    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.fired.load(Ordering::Acquire)
    }

    /// Safe checkpoint.
    #[inline]
    pub fn check(&self) -> Result<(), TimedOut> {
        if self.is_set() {
            return Err(self.0.timed_out());
        }
        Ok(())
    }
}

/// Wall-clock budget for one worker's requests.
#[derive(Debug, Default)]
pub struct Timeout {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
}

impl Timeout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the countdown. Clears a previous firing.
    pub fn arm(&mut self, budget: Duration) -> Result<(), TimeoutError> {
        if self.timer.is_none() {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name("tern-timeout".into())
                .spawn(move || run_timer(&shared))?;
            self.timer = Some(handle);
        }
        let mut schedule = self.shared.schedule.lock();
        schedule.generation += 1;
        // Cleared under the same lock the timer fires under.
        self.shared.fired.store(false, Ordering::Release);
        schedule.budget = budget;
        schedule.deadline = Instant::now().checked_add(budget);
        tracing::debug!(?budget, generation = schedule.generation, "timeout armed");
        drop(schedule);
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn arm_seconds(&mut self, seconds: u64) -> Result<(), TimeoutError> {
        self.arm(Duration::from_secs(seconds))
    }

    /// Cancel the countdown and clear the fired flag.
    pub fn disarm(&mut self) {
        let mut schedule = self.shared.schedule.lock();
        schedule.generation += 1;
        schedule.deadline = None;
        self.shared.fired.store(false, Ordering::Release);
        drop(schedule);
        self.shared.wake.notify_one();
    }

    pub fn state(&self) -> TimeoutState {
        if self.shared.fired.load(Ordering::Acquire) {
            TimeoutState::Fired
        } else if self.shared.schedule.lock().deadline.is_some() {
            TimeoutState::Armed
        } else {
            TimeoutState::Disarmed
        }
    }

    /// Safe checkpoint.
    #[inline]
    pub fn check(&self) -> Result<(), TimedOut> {
        if self.shared.fired.load(Ordering::Acquire) {
            return Err(self.shared.timed_out());
        }
        Ok(())
    }

    pub fn flag(&self) -> InterruptFlag {
        InterruptFlag(Arc::clone(&self.shared))
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.shared.schedule.lock().shutdown = true;
        self.shared.wake.notify_one();
        if let Some(handle) = self.timer.take() {
            if handle.join().is_err() {
                tracing::error!("timer thread panicked");
            }
        }
    }
}

/// Timer thread body: sleep until the deadline, then raise the flag.
fn run_timer(shared: &Shared) {
    let mut schedule = shared.schedule.lock();
    loop {
        if schedule.shutdown {
            return;
        }
        let Some(deadline) = schedule.deadline else {
            shared.wake.wait(&mut schedule);
            continue;
        };
        let generation = schedule.generation;
        if Instant::now() < deadline {
            shared.wake.wait_until(&mut schedule, deadline);
            // Re-armed, disarmed or woken early: read the schedule again.
            if schedule.generation != generation || Instant::now() < deadline {
                continue;
            }
        }
        schedule.deadline = None;
        shared.fired.store(true, Ordering::Release);
        tracing::warn!(budget = ?schedule.budget, generation, "execution timeout fired");
    }
}
