//! Load balancing - cross-CPU task migration
//!
//! The balancer walks the busiest queue tail → head with a cursor that
//! pre-advances before returning, so removing the task just returned
//! never disturbs the not-yet-visited head side: no skips, no
//! revisits. The source queue stays locked for the whole traversal;
//! only the balancer itself removes tasks mid-iteration.

use crate::arena::TaskArena;
use crate::class::SchedClass;
use crate::runqueue::{CpuId, RunQueue};
use crate::task::TaskId;

/// Load difference (percent of the busiest) that triggers migration
pub const IMBALANCE_THRESHOLD: usize = 25;

/// Don't steal from queues shorter than this
pub const MIN_LOAD_TO_STEAL: usize = 2;

/// Dequeue-safe reverse (tail → head) cursor over a run queue.
///
/// Holds the id of the next task to return, captured before the
/// previous one was handed out, exactly like the classic pre-iterating
/// load-balance iterator.
#[derive(Debug)]
pub struct RevCursor {
    next: Option<TaskId>,
}

impl RevCursor {
    /// Task at the cursor; advances one step toward the head.
    pub fn next(&mut self, tasks: &TaskArena) -> Option<TaskId> {
        let curr = self.next?;
        self.next = tasks.get(curr).and_then(|t| t.link.prev);
        Some(curr)
    }
}

/// Begin a reverse traversal: returns the tail task (if any) and a
/// cursor already advanced one step toward the head.
pub fn iter_start(rq: &RunQueue, tasks: &TaskArena) -> (Option<TaskId>, RevCursor) {
    let tail = rq.tail();
    let next = tail.and_then(|t| tasks.get(t).and_then(|t| t.link.prev));
    (tail, RevCursor { next })
}

/// Migrate up to `max_nr` tasks from `src` to `dst`.
///
/// Walks `src` tail → head, skipping the running task and tasks whose
/// affinity forbids `dst`. Each move is a full dequeue + enqueue, so a
/// task is never linked in two queues and both counts stay consistent.
pub fn move_tasks<C: SchedClass>(
    class: &C,
    src: &mut RunQueue,
    dst: &mut RunQueue,
    tasks: &mut TaskArena,
    max_nr: usize,
) -> usize {
    let mut moved = 0;
    let (first, mut cursor) = iter_start(src, tasks);
    let mut candidate = first;

    while let Some(id) = candidate {
        if moved >= max_nr {
            break;
        }
        candidate = cursor.next(tasks);

        if src.current() == Some(id) {
            continue;
        }
        let allowed = tasks
            .get(id)
            .is_some_and(|t| t.affinity().is_set(dst.cpu()));
        if !allowed {
            continue;
        }

        class.dequeue_task(src, tasks, id);
        class.enqueue_task(dst, tasks, id);
        moved += 1;
        log::debug!("migrated {} cpu{} -> cpu{}", id, src.cpu(), dst.cpu());
    }
    moved
}

/// Migrate a single task; reports whether one moved.
pub fn move_one_task<C: SchedClass>(
    class: &C,
    src: &mut RunQueue,
    dst: &mut RunQueue,
    tasks: &mut TaskArena,
) -> bool {
    move_tasks(class, src, dst, tasks, 1) == 1
}

/// Load imbalance status across a set of queue lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadImbalance {
    /// Within threshold, nothing to do
    Balanced,
    /// Migration warranted
    Unbalanced {
        busiest: CpuId,
        idlest: CpuId,
        delta: usize,
    },
}

/// Compare per-CPU loads (`None` = offline) and decide whether the
/// spread warrants a migration pass.
pub fn calculate_imbalance(loads: &[Option<usize>]) -> LoadImbalance {
    let mut min: Option<(CpuId, usize)> = None;
    let mut max: Option<(CpuId, usize)> = None;

    for (cpu, load) in loads.iter().enumerate() {
        let Some(load) = *load else {
            continue;
        };
        if min.is_none_or(|(_, l)| load < l) {
            min = Some((cpu, load));
        }
        if max.is_none_or(|(_, l)| load > l) {
            max = Some((cpu, load));
        }
    }

    let (Some((idlest, min_load)), Some((busiest, max_load))) = (min, max) else {
        return LoadImbalance::Balanced;
    };
    if busiest == idlest || max_load < MIN_LOAD_TO_STEAL {
        return LoadImbalance::Balanced;
    }

    let diff_percent = ((max_load - min_load) * 100) / max_load;
    if diff_percent > IMBALANCE_THRESHOLD {
        LoadImbalance::Unbalanced {
            busiest,
            idlest,
            delta: max_load - min_load,
        }
    } else {
        LoadImbalance::Balanced
    }
}
