//! Scheduler error handling
//!
//! The core runs under invariants enforced by construction; breaking
//! them is a host programming error, caught by debug assertions. The
//! typed errors below are what the host-facing [`SchedDomain`]
//! (crate::domain::SchedDomain) API reports for misuse it can detect.
//! An empty pick is *not* an error: it is the idle state, expressed as
//! `None`.

use core::fmt;

use crate::runqueue::CpuId;
use crate::task::TaskId;

/// Scheduler error types with context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Handle does not name a live task
    UnknownTask { task: TaskId },

    /// Enqueue of a task already linked in a run queue
    TaskAlreadyQueued { task: TaskId, cpu: CpuId },

    /// Dequeue of a task not linked anywhere
    TaskNotQueued { task: TaskId },

    /// Weight must be a positive integer
    InvalidWeight { weight: u32 },

    /// CPU index outside the domain
    InvalidCpu { cpu: CpuId, nr_cpus: usize },

    /// Operation against an offline CPU
    CpuOffline { cpu: CpuId },

    /// No online CPU intersects the task's affinity mask
    NoCpuAllowed { task: TaskId },

    /// Policy or domain parameters rejected at construction
    InvalidParams { reason: &'static str },

    /// Structural invariant breach detected in a run queue
    QueueCorrupted { cpu: CpuId, reason: &'static str },
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTask { task } => write!(f, "unknown {task}"),
            Self::TaskAlreadyQueued { task, cpu } => {
                write!(f, "{task} already queued on cpu{cpu}")
            }
            Self::TaskNotQueued { task } => write!(f, "{task} is not queued"),
            Self::InvalidWeight { weight } => write!(f, "invalid weight {weight}"),
            Self::InvalidCpu { cpu, nr_cpus } => {
                write!(f, "cpu{cpu} outside domain of {nr_cpus} CPUs")
            }
            Self::CpuOffline { cpu } => write!(f, "cpu{cpu} is offline"),
            Self::NoCpuAllowed { task } => {
                write!(f, "no online CPU allowed for {task}")
            }
            Self::InvalidParams { reason } => write!(f, "invalid parameters: {reason}"),
            Self::QueueCorrupted { cpu, reason } => {
                write!(f, "run queue cpu{cpu} corrupted: {reason}")
            }
        }
    }
}

impl SchedError {
    /// Host misuse rather than internal corruption?
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, Self::QueueCorrupted { .. })
    }
}

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;
