//! Run queue - per-CPU ordered set of runnable tasks
//!
//! Head is next to run, tail is most recently rotated in. The running
//! task stays linked (usually at the head) and is tracked by the
//! `current` cursor; rotation is a single O(1) move-to-tail.
//!
//! One run queue is one mutual-exclusion domain: the host serializes
//! every mutation of a queue (see [`SchedDomain`](crate::domain)), and
//! all operations here run to completion without blocking.

use crate::arena::TaskArena;
use crate::error::{SchedError, SchedResult};
use crate::task::TaskId;

/// Processor identifier within a scheduling domain
pub type CpuId = usize;

/// Per-CPU run queue for the weighted round-robin class.
#[derive(Debug)]
pub struct RunQueue {
    cpu: CpuId,
    head: Option<TaskId>,
    tail: Option<TaskId>,
    /// Number of linked tasks; always equals the list length.
    nr_running: usize,
    /// Task presently executing on this CPU. A cursor, not an
    /// ownership transfer: the running task remains linked.
    current: Option<TaskId>,
    /// Host-advanced clock, read by the runtime accountant.
    clock_ns: u64,
    need_resched: bool,
}

impl RunQueue {
    pub fn new(cpu: CpuId) -> Self {
        Self {
            cpu,
            head: None,
            tail: None,
            nr_running: 0,
            current: None,
            clock_ns: 0,
            need_resched: false,
        }
    }

    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    /// Count of linked runnable tasks
    pub fn len(&self) -> usize {
        self.nr_running
    }

    pub fn is_empty(&self) -> bool {
        self.nr_running == 0
    }

    pub fn head(&self) -> Option<TaskId> {
        self.head
    }

    pub fn tail(&self) -> Option<TaskId> {
        self.tail
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    /// Host commit step: record which task now occupies this CPU.
    pub fn set_current(&mut self, task: Option<TaskId>) {
        self.current = task;
    }

    pub fn clock_ns(&self) -> u64 {
        self.clock_ns
    }

    /// Advance the queue clock. The accountant clamps backwards jumps,
    /// so the host clock only needs to be monotonic-ish.
    pub fn set_clock(&mut self, now_ns: u64) {
        self.clock_ns = now_ns;
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched
    }

    /// Read and clear the reschedule request.
    pub fn take_need_resched(&mut self) -> bool {
        core::mem::take(&mut self.need_resched)
    }

    pub(crate) fn set_need_resched(&mut self) {
        self.need_resched = true;
    }

    /// Append an unlinked task at the tail and count it.
    pub(crate) fn link_tail(&mut self, tasks: &mut TaskArena, id: TaskId) {
        debug_assert!(
            tasks.get(id).is_some_and(|t| !t.is_queued()),
            "enqueue of an already-linked task"
        );
        self.attach_tail(tasks, id);
        tasks.cell(id).link.queued_on = Some(self.cpu);
        self.nr_running += 1;
    }

    /// Unlink a task and uncount it.
    pub(crate) fn unlink(&mut self, tasks: &mut TaskArena, id: TaskId) {
        debug_assert!(
            tasks.get(id).is_some_and(|t| t.link.queued_on == Some(self.cpu)),
            "dequeue of a task not linked in this queue"
        );
        self.detach(tasks, id);
        let link = &mut tasks.cell(id).link;
        link.queued_on = None;
        self.nr_running -= 1;
        if self.current == Some(id) {
            self.current = None;
        }
    }

    /// Move an already-linked task to the tail without the overhead of
    /// unlink followed by link. Membership and count are unchanged.
    pub(crate) fn move_to_tail(&mut self, tasks: &mut TaskArena, id: TaskId) {
        debug_assert!(
            tasks.get(id).is_some_and(|t| t.link.queued_on == Some(self.cpu)),
            "requeue of a task not linked in this queue"
        );
        if self.tail == Some(id) {
            return;
        }
        self.detach(tasks, id);
        self.attach_tail(tasks, id);
    }

    fn attach_tail(&mut self, tasks: &mut TaskArena, id: TaskId) {
        let old_tail = self.tail;
        {
            let link = &mut tasks.cell(id).link;
            link.prev = old_tail;
            link.next = None;
        }
        match old_tail {
            Some(tail) => tasks.cell(tail).link.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
    }

    fn detach(&mut self, tasks: &mut TaskArena, id: TaskId) {
        let (prev, next) = {
            let link = &tasks.cell(id).link;
            (link.prev, link.next)
        };
        match prev {
            Some(p) => tasks.cell(p).link.next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => tasks.cell(n).link.prev = prev,
            None => self.tail = prev,
        }
        let link = &mut tasks.cell(id).link;
        link.prev = None;
        link.next = None;
    }

    /// Iterate head → tail.
    pub fn iter<'a>(&self, tasks: &'a TaskArena) -> QueueIter<'a> {
        QueueIter {
            tasks,
            next: self.head,
        }
    }

    /// Verify the structural invariants: count matches the list, links
    /// are symmetric, and every member records this queue.
    pub fn check_consistency(&self, tasks: &TaskArena) -> SchedResult<()> {
        let corrupted = |reason| SchedError::QueueCorrupted {
            cpu: self.cpu,
            reason,
        };

        let mut seen = 0usize;
        let mut prev: Option<TaskId> = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let task = tasks.get(id).ok_or(corrupted("dangling task handle"))?;
            if task.link.queued_on != Some(self.cpu) {
                return Err(corrupted("member does not record this queue"));
            }
            if task.link.prev != prev {
                return Err(corrupted("asymmetric prev link"));
            }
            seen += 1;
            if seen > self.nr_running {
                return Err(corrupted("list longer than nr_running"));
            }
            prev = Some(id);
            cursor = task.link.next;
        }
        if seen != self.nr_running {
            return Err(corrupted("nr_running does not match list length"));
        }
        if self.tail != prev {
            return Err(corrupted("tail does not match last member"));
        }
        if let Some(curr) = self.current {
            let task = tasks.get(curr).ok_or(corrupted("dangling current handle"))?;
            if task.link.queued_on != Some(self.cpu) {
                return Err(corrupted("current not linked in this queue"));
            }
        }
        Ok(())
    }
}

/// Forward (head → tail) queue iterator
pub struct QueueIter<'a> {
    tasks: &'a TaskArena,
    next: Option<TaskId>,
}

impl<'a> Iterator for QueueIter<'a> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let id = self.next?;
        self.next = self.tasks.get(id).and_then(|t| t.link.next);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::CpuMask;
    use alloc::vec::Vec;

    fn setup(n: usize) -> (RunQueue, TaskArena, Vec<TaskId>) {
        let mut arena = TaskArena::new();
        let ids = (0..n).map(|_| arena.insert(1, 4, CpuMask::all())).collect();
        (RunQueue::new(0), arena, ids)
    }

    #[test]
    fn test_link_tail_fifo_order() {
        let (mut rq, mut arena, ids) = setup(3);
        for &id in &ids {
            rq.link_tail(&mut arena, id);
        }
        assert_eq!(rq.len(), 3);
        assert_eq!(rq.head(), Some(ids[0]));
        assert_eq!(rq.tail(), Some(ids[2]));
        let order: Vec<TaskId> = rq.iter(&arena).collect();
        assert_eq!(order, ids);
        rq.check_consistency(&arena).unwrap();
    }

    #[test]
    fn test_unlink_middle_and_ends() {
        let (mut rq, mut arena, ids) = setup(3);
        for &id in &ids {
            rq.link_tail(&mut arena, id);
        }

        rq.unlink(&mut arena, ids[1]);
        assert_eq!(rq.len(), 2);
        assert!(!arena.get(ids[1]).unwrap().is_queued());
        let order: Vec<TaskId> = rq.iter(&arena).collect();
        assert_eq!(order, [ids[0], ids[2]]);
        rq.check_consistency(&arena).unwrap();

        rq.unlink(&mut arena, ids[0]);
        rq.unlink(&mut arena, ids[2]);
        assert!(rq.is_empty());
        assert_eq!(rq.head(), None);
        assert_eq!(rq.tail(), None);
        rq.check_consistency(&arena).unwrap();
    }

    #[test]
    fn test_move_to_tail_rotates() {
        let (mut rq, mut arena, ids) = setup(3);
        for &id in &ids {
            rq.link_tail(&mut arena, id);
        }
        rq.move_to_tail(&mut arena, ids[0]);
        let order: Vec<TaskId> = rq.iter(&arena).collect();
        assert_eq!(order, [ids[1], ids[2], ids[0]]);
        assert_eq!(rq.len(), 3);
        rq.check_consistency(&arena).unwrap();

        // already at tail: no-op
        rq.move_to_tail(&mut arena, ids[0]);
        let order: Vec<TaskId> = rq.iter(&arena).collect();
        assert_eq!(order, [ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn test_unlink_current_clears_cursor() {
        let (mut rq, mut arena, ids) = setup(2);
        for &id in &ids {
            rq.link_tail(&mut arena, id);
        }
        rq.set_current(Some(ids[0]));
        rq.unlink(&mut arena, ids[0]);
        assert_eq!(rq.current(), None);
    }

    #[test]
    fn test_take_need_resched() {
        let (mut rq, _, _) = setup(0);
        assert!(!rq.take_need_resched());
        rq.set_need_resched();
        assert!(rq.need_resched());
        assert!(rq.take_need_resched());
        assert!(!rq.need_resched());
    }
}
