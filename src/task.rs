//! Task descriptor - per-task scheduling state
//!
//! The broader process-management subsystem owns the task; this class
//! only reads and writes the scheduling-relevant fields below. Queue
//! membership is tracked by explicit doubly-linked indices inside the
//! descriptor, so link/unlink/requeue are all O(1).

use core::fmt;

use bitflags::bitflags;

use crate::affinity::CpuMask;
use crate::runqueue::CpuId;

/// Handle to a task descriptor in a [`TaskArena`](crate::arena::TaskArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    /// Arena slot index backing this handle
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task{}", self.0)
    }
}

bitflags! {
    /// Per-task scheduling flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TaskFlags: u8 {
        /// Slice expired with contention; the host should switch before
        /// the next tick.
        const NEED_RESCHED = 1 << 0;
    }
}

/// Position of a task within its run queue, or unlinked.
///
/// `queued_on` is the single-queue-membership invariant made explicit:
/// a task is linked on at most one CPU at a time.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueueLink {
    pub prev: Option<TaskId>,
    pub next: Option<TaskId>,
    pub queued_on: Option<CpuId>,
}

/// Per-task scheduling state for the weighted round-robin class.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    /// Host-configured weight; determines the slice length.
    weight: u32,
    /// Ticks granted per rotation, derived from `weight`.
    base_slice: u32,
    /// Ticks left before mandatory rotation consideration.
    remaining_slice: u32,
    /// Clock reading when the task last started executing; `None` while
    /// not running.
    exec_start: Option<u64>,
    /// Cumulative executed time, monotonically non-decreasing.
    sum_runtime: u64,
    /// Longest single execution delta observed.
    exec_max: u64,
    flags: TaskFlags,
    affinity: CpuMask,
    pub(crate) link: QueueLink,
}

impl Task {
    pub(crate) fn new(id: TaskId, weight: u32, base_slice: u32, affinity: CpuMask) -> Self {
        Self {
            id,
            weight,
            base_slice,
            remaining_slice: base_slice,
            exec_start: None,
            sum_runtime: 0,
            exec_max: 0,
            flags: TaskFlags::empty(),
            affinity,
            link: QueueLink::default(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Reconfigure weight and the slice derived from it. The remaining
    /// slice is left alone until the next reset.
    pub(crate) fn set_weight(&mut self, weight: u32, base_slice: u32) {
        self.weight = weight;
        self.base_slice = base_slice;
    }

    pub fn base_slice(&self) -> u32 {
        self.base_slice
    }

    pub fn remaining_slice(&self) -> u32 {
        self.remaining_slice
    }

    pub(crate) fn set_remaining_slice(&mut self, ticks: u32) {
        self.remaining_slice = ticks;
    }

    pub fn exec_start(&self) -> Option<u64> {
        self.exec_start
    }

    pub(crate) fn set_exec_start(&mut self, start: Option<u64>) {
        self.exec_start = start;
    }

    pub fn sum_runtime(&self) -> u64 {
        self.sum_runtime
    }

    /// Charge executed time. Deltas are pre-clamped by the accountant.
    pub(crate) fn charge_runtime(&mut self, delta: u64) {
        self.sum_runtime += delta;
        if delta > self.exec_max {
            self.exec_max = delta;
        }
    }

    pub fn exec_max(&self) -> u64 {
        self.exec_max
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    pub fn needs_resched(&self) -> bool {
        self.flags.contains(TaskFlags::NEED_RESCHED)
    }

    pub(crate) fn set_need_resched(&mut self) {
        self.flags.insert(TaskFlags::NEED_RESCHED);
    }

    pub(crate) fn clear_need_resched(&mut self) {
        self.flags.remove(TaskFlags::NEED_RESCHED);
    }

    pub fn affinity(&self) -> CpuMask {
        self.affinity
    }

    pub fn set_affinity(&mut self, mask: CpuMask) {
        self.affinity = mask;
    }

    /// Whether the task is linked into a run queue.
    pub fn is_queued(&self) -> bool {
        self.link.queued_on.is_some()
    }

    /// CPU whose run queue holds this task, if any.
    pub fn queued_on(&self) -> Option<CpuId> {
        self.link.queued_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let t = Task::new(TaskId(0), 3, 6, CpuMask::all());
        assert_eq!(t.weight(), 3);
        assert_eq!(t.base_slice(), 6);
        assert_eq!(t.remaining_slice(), 6);
        assert_eq!(t.sum_runtime(), 0);
        assert_eq!(t.exec_start(), None);
        assert!(!t.is_queued());
        assert!(!t.needs_resched());
    }

    #[test]
    fn test_charge_runtime_tracks_max() {
        let mut t = Task::new(TaskId(1), 1, 1, CpuMask::all());
        t.charge_runtime(10);
        t.charge_runtime(4);
        assert_eq!(t.sum_runtime(), 14);
        assert_eq!(t.exec_max(), 10);
    }

    #[test]
    fn test_set_weight_keeps_remaining() {
        let mut t = Task::new(TaskId(2), 2, 4, CpuMask::all());
        t.set_remaining_slice(1);
        t.set_weight(5, 10);
        assert_eq!(t.base_slice(), 10);
        assert_eq!(t.remaining_slice(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(alloc::format!("{}", TaskId(7)), "task7");
    }
}
