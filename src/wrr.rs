//! Weighted round-robin scheduling class
//!
//! Queue discipline is plain FIFO; weight buys a longer slice per
//! turn, never an earlier turn. The tick handler is the fairness core:
//! it charges runtime, burns one slice tick, and on expiry resets the
//! slice and rotates the task to the tail — but only when rotation
//! would actually change who runs next.

use crate::arena::TaskArena;
use crate::class::SchedClass;
use crate::error::{SchedError, SchedResult};
use crate::runqueue::RunQueue;
use crate::task::TaskId;

/// Weight → slice mapping parameters.
///
/// The mapping is monotonic: a higher weight never yields a shorter
/// slice. Hosts that map weights themselves can feed the result in as
/// `ticks_per_weight = 1` and pass the slice as the weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrrParams {
    /// Slice ticks granted per unit of weight
    pub ticks_per_weight: u32,
    /// Floor for the derived slice
    pub min_slice: u32,
    /// Ceiling for the derived slice
    pub max_slice: u32,
}

impl WrrParams {
    pub const fn new(ticks_per_weight: u32, min_slice: u32, max_slice: u32) -> Self {
        Self {
            ticks_per_weight,
            min_slice,
            max_slice,
        }
    }

    /// Validate parameters
    pub fn validate(&self) -> SchedResult<()> {
        if self.ticks_per_weight == 0 {
            return Err(SchedError::InvalidParams {
                reason: "ticks_per_weight must be positive",
            });
        }
        if self.min_slice == 0 {
            return Err(SchedError::InvalidParams {
                reason: "min_slice must be positive",
            });
        }
        if self.min_slice > self.max_slice {
            return Err(SchedError::InvalidParams {
                reason: "min_slice exceeds max_slice",
            });
        }
        Ok(())
    }

    /// Slice length in ticks for a configured weight.
    pub fn slice_for_weight(&self, weight: u32) -> u32 {
        weight
            .saturating_mul(self.ticks_per_weight)
            .clamp(self.min_slice, self.max_slice)
    }
}

impl Default for WrrParams {
    fn default() -> Self {
        Self::new(1, 1, u32::MAX)
    }
}

/// The weighted round-robin policy.
#[derive(Debug, Clone)]
pub struct WeightedRr {
    params: WrrParams,
}

impl WeightedRr {
    pub fn new(params: WrrParams) -> SchedResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &WrrParams {
        &self.params
    }

    /// Runtime accountant: charge the running task for the time elapsed
    /// since `exec_start`, then restart the window at the queue clock.
    ///
    /// Called before anything that changes what is "current". Negative
    /// deltas (clock skew, out-of-order stamps) clamp to zero instead
    /// of propagating; calling twice at the same clock adds nothing the
    /// second time.
    pub fn update_curr(&self, rq: &mut RunQueue, tasks: &mut TaskArena) {
        let Some(curr) = rq.current() else {
            return;
        };
        let now = rq.clock_ns();
        let Some(task) = tasks.get_mut(curr) else {
            debug_assert!(false, "current is a stale handle");
            return;
        };
        let Some(start) = task.exec_start() else {
            return;
        };
        let delta = now.saturating_sub(start);
        task.charge_runtime(delta);
        task.set_exec_start(Some(now));
    }

    /// O(1) move of an already-linked task to the tail. No accounting
    /// side effects: the task stays runnable, only its position moves.
    pub fn requeue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        rq.move_to_tail(tasks, task);
    }
}

impl SchedClass for WeightedRr {
    fn enqueue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        rq.link_tail(tasks, task);
        log::trace!("enqueue {} on cpu{} (nr_running={})", task, rq.cpu(), rq.len());
    }

    fn dequeue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        // Flush the partial tick before the task disappears; no
        // accounted time is lost on sleep or migration.
        self.update_curr(rq, tasks);
        let was_current = rq.current() == Some(task);
        rq.unlink(tasks, task);
        if was_current {
            if let Some(t) = tasks.get_mut(task) {
                t.set_exec_start(None);
            }
        }
        log::trace!("dequeue {} from cpu{} (nr_running={})", task, rq.cpu(), rq.len());
    }

    fn yield_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena) {
        let Some(curr) = rq.current() else {
            return;
        };
        if rq.len() > 1 {
            rq.move_to_tail(tasks, curr);
        }
    }

    fn check_preempt_curr(&self, _rq: &mut RunQueue, _tasks: &mut TaskArena, _task: TaskId) {
        // Cooperative within the class: a newly-woken task waits its
        // turn in FIFO order instead of preempting.
    }

    fn pick_next_task(&self, rq: &RunQueue, _tasks: &TaskArena) -> Option<TaskId> {
        // Head stays linked; it becomes current only once the host
        // commits to the switch.
        rq.head()
    }

    fn put_prev_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        self.update_curr(rq, tasks);
        if let Some(t) = tasks.get_mut(task) {
            t.set_exec_start(None);
        }
    }

    fn set_curr_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena) {
        let Some(curr) = rq.current() else {
            return;
        };
        let now = rq.clock_ns();
        if let Some(task) = tasks.get_mut(curr) {
            task.set_exec_start(Some(now));
        }
    }

    fn task_tick(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        debug_assert_eq!(rq.current(), Some(task), "tick for a non-current task");
        self.update_curr(rq, tasks);

        let nr_running = rq.len();
        let Some(t) = tasks.get_mut(task) else {
            debug_assert!(false, "tick for a stale handle");
            return;
        };

        t.set_remaining_slice(t.remaining_slice().saturating_sub(1));
        if t.remaining_slice() > 0 {
            return;
        }

        // Expired: the zero never persists past this tick.
        t.set_remaining_slice(t.base_slice());

        // Rotate only if someone else could run; the sole runnable task
        // keeps the CPU with a fresh slice and no reschedule request.
        if nr_running > 1 {
            t.set_need_resched();
            rq.set_need_resched();
            rq.move_to_tail(tasks, task);
            log::trace!("slice expired, rotated {} on cpu{}", task, rq.cpu());
        }
    }
}
