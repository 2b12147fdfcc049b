//! Weighted round-robin scheduling class core
//!
//! A flat weighted round-robin policy: every runnable task owns a time
//! slice derived from its weight, runs from the head of a per-CPU FIFO
//! run queue, and rotates to the tail when the slice expires. Weight
//! controls duration per turn, never frequency or priority.
//!
//! The crate is the scheduling-class core only. Process lifecycle,
//! interrupt delivery and the physical context switch belong to the
//! host, which drives this core at well-defined points:
//!
//! - task state transitions → [`SchedClass`] enqueue/dequeue/yield
//! - timer interrupt → [`SchedClass::task_tick`]
//! - commit to a switch → [`SchedClass::pick_next_task`] + switch hooks
//! - periodic balancing → [`balance`] cursor and migration helpers
//!
//! [`SchedDomain`] wraps all of the above into one explicitly passed
//! multi-CPU context object (per-CPU `spin::Mutex` run queues plus a
//! shared task arena) for hosts that want a ready-made dispatcher.

#![no_std]

extern crate alloc;

pub mod affinity;
pub mod arena;
pub mod balance;
pub mod class;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod runqueue;
pub mod task;
pub mod wrr;

pub use affinity::CpuMask;
pub use arena::TaskArena;
pub use balance::{iter_start, LoadImbalance, RevCursor};
pub use class::{SchedClass, SchedPolicy};
pub use domain::SchedDomain;
pub use error::{SchedError, SchedResult};
pub use metrics::{MetricsSnapshot, SchedMetrics};
pub use runqueue::{CpuId, RunQueue};
pub use task::{Task, TaskFlags, TaskId};
pub use wrr::{WeightedRr, WrrParams};
