//! Scheduling class dispatch
//!
//! The host dispatcher drives pluggable scheduling classes through the
//! [`SchedClass`] capability set, asking each class in priority order
//! for work. [`SchedPolicy`] is the tagged-variant registry of the
//! classes this crate ships; dispatch is a plain `match`, no vtable.

use crate::arena::TaskArena;
use crate::runqueue::RunQueue;
use crate::task::TaskId;
use crate::wrr::WeightedRr;

/// Capability set a scheduling class exposes to the host dispatcher.
///
/// All operations are synchronous and non-blocking; they run to
/// completion inside the interrupt/scheduling context while the host
/// holds the queue's lock.
pub trait SchedClass {
    /// Make `task` runnable under this class: append at the queue tail.
    fn enqueue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId);

    /// Remove `task` from the queue (sleep, block, or migration). The
    /// running task's partial tick is charged before removal.
    fn dequeue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId);

    /// The running task voluntarily relinquishes the CPU: rotate it to
    /// the tail.
    fn yield_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena);

    /// A task just became runnable; decide whether to preempt the
    /// running task.
    fn check_preempt_curr(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId);

    /// Task at the head of the queue, without removing it. `None` means
    /// this class has nothing to run (idle fall-through, not an error).
    fn pick_next_task(&self, rq: &RunQueue, tasks: &TaskArena) -> Option<TaskId>;

    /// The running task is being switched out: charge its runtime and
    /// stop the accounting clock.
    fn put_prev_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId);

    /// The queue's current task is about to start executing: start its
    /// accounting clock.
    fn set_curr_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena);

    /// Scheduler timer tick for the running `task`.
    fn task_tick(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId);
}

/// Concrete scheduling classes, dispatched by variant.
#[derive(Debug, Clone)]
pub enum SchedPolicy {
    /// Flat weighted round robin
    WeightedRr(WeightedRr),
}

impl SchedPolicy {
    pub fn weighted_rr(class: WeightedRr) -> Self {
        Self::WeightedRr(class)
    }

    pub fn as_weighted_rr(&self) -> Option<&WeightedRr> {
        match self {
            Self::WeightedRr(class) => Some(class),
        }
    }
}

impl SchedClass for SchedPolicy {
    fn enqueue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        match self {
            Self::WeightedRr(class) => class.enqueue_task(rq, tasks, task),
        }
    }

    fn dequeue_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        match self {
            Self::WeightedRr(class) => class.dequeue_task(rq, tasks, task),
        }
    }

    fn yield_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena) {
        match self {
            Self::WeightedRr(class) => class.yield_task(rq, tasks),
        }
    }

    fn check_preempt_curr(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        match self {
            Self::WeightedRr(class) => class.check_preempt_curr(rq, tasks, task),
        }
    }

    fn pick_next_task(&self, rq: &RunQueue, tasks: &TaskArena) -> Option<TaskId> {
        match self {
            Self::WeightedRr(class) => class.pick_next_task(rq, tasks),
        }
    }

    fn put_prev_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        match self {
            Self::WeightedRr(class) => class.put_prev_task(rq, tasks, task),
        }
    }

    fn set_curr_task(&self, rq: &mut RunQueue, tasks: &mut TaskArena) {
        match self {
            Self::WeightedRr(class) => class.set_curr_task(rq, tasks),
        }
    }

    fn task_tick(&self, rq: &mut RunQueue, tasks: &mut TaskArena, task: TaskId) {
        match self {
            Self::WeightedRr(class) => class.task_tick(rq, tasks, task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::CpuMask;
    use crate::wrr::WrrParams;

    #[test]
    fn test_variant_dispatch() {
        let policy = SchedPolicy::weighted_rr(WeightedRr::new(WrrParams::default()).unwrap());
        let mut rq = RunQueue::new(0);
        let mut arena = TaskArena::new();
        let a = arena.insert(1, 2, CpuMask::all());

        policy.enqueue_task(&mut rq, &mut arena, a);
        assert_eq!(policy.pick_next_task(&rq, &arena), Some(a));
        policy.dequeue_task(&mut rq, &mut arena, a);
        assert_eq!(policy.pick_next_task(&rq, &arena), None);
        assert!(policy.as_weighted_rr().is_some());
    }
}
