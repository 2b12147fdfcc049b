//! Task arena - slab storage for task descriptors
//!
//! The host's process subsystem owns one arena per scheduling domain
//! and hands out [`TaskId`] handles. Freed slots are recycled, so a
//! handle is only valid until the task behind it is removed.

use alloc::vec::Vec;

use crate::affinity::CpuMask;
use crate::task::{Task, TaskId};

/// Slab-style arena owning every task descriptor of a domain.
#[derive(Debug, Default)]
pub struct TaskArena {
    slots: Vec<Option<Task>>,
    free: Vec<u32>,
}

impl TaskArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a descriptor and return its handle.
    pub fn insert(&mut self, weight: u32, base_slice: u32, affinity: CpuMask) -> TaskId {
        let id = match self.free.pop() {
            Some(slot) => TaskId(slot),
            None => {
                self.slots.push(None);
                TaskId((self.slots.len() - 1) as u32)
            }
        };
        self.slots[id.index()] = Some(Task::new(id, weight, base_slice, affinity));
        id
    }

    /// Remove a descriptor. The task must be unlinked from any run
    /// queue first; removing a linked task is a host bug.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let slot = self.slots.get_mut(id.index())?;
        let task = slot.take()?;
        debug_assert!(!task.is_queued(), "removed a task still linked in a run queue");
        self.free.push(id.0);
        Some(task)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    /// Iterate over live tasks in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// Internal accessor for link surgery. The handle must be live;
    /// callers operate under the queue-membership invariants.
    pub(crate) fn cell(&mut self, id: TaskId) -> &mut Task {
        self.slots[id.index()]
            .as_mut()
            .expect("stale task handle in run queue linkage")
    }
}
