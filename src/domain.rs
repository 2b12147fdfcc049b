//! Scheduling domain - explicit multi-CPU context
//!
//! One `SchedDomain` replaces the classic per-CPU run-queue globals:
//! it owns the task arena, one mutex-guarded run queue per CPU, the
//! policy instance and the metrics, and exposes the host-facing
//! dispatcher API (wake/sleep/tick/pick/switch/balance).
//!
//! Locking: the arena mutex is the outer lock of every mutating
//! operation; per-queue mutexes nest inside it and are the
//! per-processor mutual-exclusion domain of spec'd queue state. The
//! balance pass reads queue lengths lock-by-lock without the arena.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::affinity::CpuMask;
use crate::arena::TaskArena;
use crate::balance::{self, LoadImbalance};
use crate::class::{SchedClass, SchedPolicy};
use crate::error::{SchedError, SchedResult};
use crate::metrics::SchedMetrics;
use crate::runqueue::{CpuId, RunQueue};
use crate::task::{Task, TaskId};
use crate::wrr::{WeightedRr, WrrParams};

/// Multi-CPU weighted round-robin scheduling context.
pub struct SchedDomain {
    policy: SchedPolicy,
    params: WrrParams,
    tasks: Mutex<TaskArena>,
    queues: Vec<Mutex<RunQueue>>,
    online: Vec<AtomicBool>,
    metrics: SchedMetrics,
}

impl SchedDomain {
    /// Build a domain with `nr_cpus` online run queues.
    pub fn new(nr_cpus: usize, params: WrrParams) -> SchedResult<Self> {
        if nr_cpus == 0 || nr_cpus > 64 {
            return Err(SchedError::InvalidParams {
                reason: "nr_cpus must be between 1 and 64",
            });
        }
        let class = WeightedRr::new(params)?;

        let mut queues = Vec::with_capacity(nr_cpus);
        let mut online = Vec::with_capacity(nr_cpus);
        for cpu in 0..nr_cpus {
            queues.push(Mutex::new(RunQueue::new(cpu)));
            online.push(AtomicBool::new(true));
        }

        Ok(Self {
            policy: SchedPolicy::weighted_rr(class),
            params,
            tasks: Mutex::new(TaskArena::new()),
            queues,
            online,
            metrics: SchedMetrics::new(),
        })
    }

    pub fn nr_cpus(&self) -> usize {
        self.queues.len()
    }

    pub fn params(&self) -> &WrrParams {
        &self.params
    }

    pub fn metrics(&self) -> &SchedMetrics {
        &self.metrics
    }

    pub fn is_online(&self, cpu: CpuId) -> bool {
        self.online
            .get(cpu)
            .is_some_and(|o| o.load(Ordering::Relaxed))
    }

    fn check_cpu(&self, cpu: CpuId) -> SchedResult<()> {
        if cpu >= self.queues.len() {
            return Err(SchedError::InvalidCpu {
                cpu,
                nr_cpus: self.queues.len(),
            });
        }
        Ok(())
    }

    /// Mask of CPUs that exist in this domain.
    fn domain_mask(&self) -> CpuMask {
        let mut mask = CpuMask::empty();
        for cpu in 0..self.queues.len() {
            mask.set(cpu);
        }
        mask
    }

    // ── Task lifecycle ──────────────────────────────────────────────

    /// Register a task with this class. The slice is derived from the
    /// weight through the domain parameters.
    pub fn create_task(&self, weight: u32, affinity: CpuMask) -> SchedResult<TaskId> {
        if weight == 0 {
            return Err(SchedError::InvalidWeight { weight });
        }
        if affinity.intersect(&self.domain_mask()).is_empty() {
            return Err(SchedError::InvalidParams {
                reason: "affinity excludes every domain CPU",
            });
        }
        let base_slice = self.params.slice_for_weight(weight);
        let id = self.tasks.lock().insert(weight, base_slice, affinity);
        log::debug!("created {} (weight={}, base_slice={})", id, weight, base_slice);
        Ok(id)
    }

    /// Drop a task descriptor. The task must not be runnable.
    pub fn destroy_task(&self, task: TaskId) -> SchedResult<()> {
        let mut tasks = self.tasks.lock();
        let t = tasks.get(task).ok_or(SchedError::UnknownTask { task })?;
        if let Some(cpu) = t.queued_on() {
            return Err(SchedError::TaskAlreadyQueued { task, cpu });
        }
        tasks.remove(task);
        Ok(())
    }

    /// Reconfigure a task's weight. Takes effect at the next slice
    /// reset; the remaining slice is untouched.
    pub fn set_weight(&self, task: TaskId, weight: u32) -> SchedResult<()> {
        if weight == 0 {
            return Err(SchedError::InvalidWeight { weight });
        }
        let base_slice = self.params.slice_for_weight(weight);
        let mut tasks = self.tasks.lock();
        let t = tasks.get_mut(task).ok_or(SchedError::UnknownTask { task })?;
        t.set_weight(weight, base_slice);
        Ok(())
    }

    /// Change a task's CPU affinity; migrates it immediately if it is
    /// queued on a now-forbidden CPU.
    pub fn set_affinity(&self, task: TaskId, affinity: CpuMask) -> SchedResult<()> {
        if affinity.intersect(&self.domain_mask()).is_empty() {
            return Err(SchedError::InvalidParams {
                reason: "affinity excludes every domain CPU",
            });
        }
        let mut tasks = self.tasks.lock();
        let t = tasks.get_mut(task).ok_or(SchedError::UnknownTask { task })?;
        t.set_affinity(affinity);
        let queued_on = t.queued_on();

        if let Some(cpu) = queued_on {
            if !affinity.is_set(cpu) {
                let target = self
                    .select_cpu(&affinity, Some(cpu))
                    .ok_or(SchedError::NoCpuAllowed { task })?;
                let mut src = self.queues[cpu].lock();
                let mut dst = self.queues[target].lock();
                self.policy.dequeue_task(&mut src, &mut tasks, task);
                self.policy.enqueue_task(&mut dst, &mut tasks, task);
                self.metrics.record_migrations(1);
                log::debug!("affinity change migrated {} cpu{} -> cpu{}", task, cpu, target);
            }
        }
        Ok(())
    }

    /// Read-only access to a task descriptor.
    pub fn with_task<R>(&self, task: TaskId, f: impl FnOnce(&Task) -> R) -> SchedResult<R> {
        let tasks = self.tasks.lock();
        let t = tasks.get(task).ok_or(SchedError::UnknownTask { task })?;
        Ok(f(t))
    }

    // ── Dispatcher entry points ─────────────────────────────────────

    /// Wake: make `task` runnable, placing it on the least-loaded
    /// online CPU its affinity allows. Returns the chosen CPU.
    pub fn enqueue(&self, task: TaskId) -> SchedResult<CpuId> {
        let mut tasks = self.tasks.lock();
        let t = tasks.get(task).ok_or(SchedError::UnknownTask { task })?;
        if let Some(cpu) = t.queued_on() {
            return Err(SchedError::TaskAlreadyQueued { task, cpu });
        }
        let affinity = t.affinity();
        let cpu = self
            .select_cpu(&affinity, None)
            .ok_or(SchedError::NoCpuAllowed { task })?;

        let mut rq = self.queues[cpu].lock();
        self.policy.enqueue_task(&mut rq, &mut tasks, task);
        self.policy.check_preempt_curr(&mut rq, &mut tasks, task);
        self.metrics.record_enqueue();
        Ok(cpu)
    }

    /// Wake onto a specific CPU.
    pub fn enqueue_on(&self, task: TaskId, cpu: CpuId) -> SchedResult<()> {
        self.check_cpu(cpu)?;
        if !self.is_online(cpu) {
            return Err(SchedError::CpuOffline { cpu });
        }
        let mut tasks = self.tasks.lock();
        let t = tasks.get(task).ok_or(SchedError::UnknownTask { task })?;
        if let Some(on) = t.queued_on() {
            return Err(SchedError::TaskAlreadyQueued { task, cpu: on });
        }
        if !t.affinity().is_set(cpu) {
            return Err(SchedError::NoCpuAllowed { task });
        }
        let mut rq = self.queues[cpu].lock();
        self.policy.enqueue_task(&mut rq, &mut tasks, task);
        self.policy.check_preempt_curr(&mut rq, &mut tasks, task);
        self.metrics.record_enqueue();
        Ok(())
    }

    /// Sleep/block: remove `task` from its run queue. Partial runtime
    /// is flushed before removal. Returns the CPU it left.
    pub fn dequeue(&self, task: TaskId) -> SchedResult<CpuId> {
        let mut tasks = self.tasks.lock();
        let t = tasks.get(task).ok_or(SchedError::UnknownTask { task })?;
        let cpu = t.queued_on().ok_or(SchedError::TaskNotQueued { task })?;

        let mut rq = self.queues[cpu].lock();
        self.policy.dequeue_task(&mut rq, &mut tasks, task);
        self.metrics.record_dequeue();
        Ok(cpu)
    }

    /// Advance the CPU clock without any other side effect.
    pub fn set_clock(&self, cpu: CpuId, now_ns: u64) -> SchedResult<()> {
        self.check_cpu(cpu)?;
        self.queues[cpu].lock().set_clock(now_ns);
        Ok(())
    }

    /// Scheduler timer tick for `cpu` at `now_ns`. Returns whether a
    /// reschedule is requested.
    pub fn tick(&self, cpu: CpuId, now_ns: u64) -> SchedResult<bool> {
        self.check_cpu(cpu)?;
        let mut tasks = self.tasks.lock();
        let mut rq = self.queues[cpu].lock();
        rq.set_clock(now_ns);

        let Some(curr) = rq.current() else {
            return Ok(false);
        };
        let expiring = tasks
            .get(curr)
            .is_some_and(|t| t.remaining_slice() == 1);

        self.policy.task_tick(&mut rq, &mut tasks, curr);
        self.metrics.record_tick();
        if expiring {
            self.metrics.record_slice_reset(rq.need_resched());
        }
        Ok(rq.need_resched())
    }

    /// Ask the class for the next task without committing.
    pub fn pick_next(&self, cpu: CpuId) -> SchedResult<Option<TaskId>> {
        self.check_cpu(cpu)?;
        let tasks = self.tasks.lock();
        let rq = self.queues[cpu].lock();
        Ok(self.policy.pick_next_task(&rq, &tasks))
    }

    /// Switch out the running task (if any), pick the head, and commit
    /// it as current. Returns the new current; `None` means the host
    /// should fall through to its idle task.
    pub fn switch(&self, cpu: CpuId, now_ns: u64) -> SchedResult<Option<TaskId>> {
        self.check_cpu(cpu)?;
        let mut tasks = self.tasks.lock();
        let mut rq = self.queues[cpu].lock();
        rq.set_clock(now_ns);

        if let Some(prev) = rq.current() {
            self.policy.put_prev_task(&mut rq, &mut tasks, prev);
            if let Some(t) = tasks.get_mut(prev) {
                t.clear_need_resched();
            }
        }
        rq.take_need_resched();

        let next = self.policy.pick_next_task(&rq, &tasks);
        rq.set_current(next);
        if next.is_some() {
            self.policy.set_curr_task(&mut rq, &mut tasks);
        }
        self.metrics.record_pick(next.is_none());
        Ok(next)
    }

    /// The running task on `cpu` voluntarily relinquishes the CPU.
    pub fn yield_cpu(&self, cpu: CpuId) -> SchedResult<()> {
        self.check_cpu(cpu)?;
        let mut tasks = self.tasks.lock();
        let mut rq = self.queues[cpu].lock();
        self.policy.yield_task(&mut rq, &mut tasks);
        self.metrics.record_yield();
        Ok(())
    }

    pub fn current(&self, cpu: CpuId) -> SchedResult<Option<TaskId>> {
        self.check_cpu(cpu)?;
        Ok(self.queues[cpu].lock().current())
    }

    pub fn queue_len(&self, cpu: CpuId) -> SchedResult<usize> {
        self.check_cpu(cpu)?;
        Ok(self.queues[cpu].lock().len())
    }

    // ── Load balancing & hotplug ────────────────────────────────────

    /// Least-loaded online CPU allowed by `affinity`, excluding
    /// `exclude`. Caller may hold the arena lock but no queue lock on
    /// a candidate CPU.
    fn select_cpu(&self, affinity: &CpuMask, exclude: Option<CpuId>) -> Option<CpuId> {
        let mut best: Option<(CpuId, usize)> = None;
        for cpu in 0..self.queues.len() {
            if Some(cpu) == exclude || !self.is_online(cpu) || !affinity.is_set(cpu) {
                continue;
            }
            let load = self.queues[cpu].lock().len();
            if best.is_none_or(|(_, l)| load < l) {
                best = Some((cpu, load));
            }
        }
        best.map(|(cpu, _)| cpu)
    }

    /// One balance pass: compare queue lengths and migrate from the
    /// busiest to the idlest queue when the spread crosses the
    /// threshold. Returns the number of migrated tasks.
    pub fn rebalance(&self) -> usize {
        self.metrics.record_balance_pass();

        let loads: Vec<Option<usize>> = (0..self.queues.len())
            .map(|cpu| self.is_online(cpu).then(|| self.queues[cpu].lock().len()))
            .collect();

        let LoadImbalance::Unbalanced { busiest, idlest, delta } =
            balance::calculate_imbalance(&loads)
        else {
            return 0;
        };

        let mut tasks = self.tasks.lock();
        // ascending-id order, consistent with every other dual-lock path
        let (mut src, mut dst) = if busiest < idlest {
            let src = self.queues[busiest].lock();
            let dst = self.queues[idlest].lock();
            (src, dst)
        } else {
            let dst = self.queues[idlest].lock();
            let src = self.queues[busiest].lock();
            (src, dst)
        };

        let max_nr = (delta / 2).max(1);
        let moved = balance::move_tasks(&self.policy, &mut src, &mut dst, &mut tasks, max_nr);
        self.metrics.record_migrations(moved as u64);
        moved as usize
    }

    /// Bring a CPU back online.
    pub fn online_cpu(&self, cpu: CpuId) -> SchedResult<()> {
        self.check_cpu(cpu)?;
        self.online[cpu].store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Take a CPU offline, migrating every linked task elsewhere.
    /// Tasks are never dropped: if any task has no other allowed
    /// online CPU, the queue is left intact, the CPU stays online and
    /// the call fails. Returns the number of drained tasks.
    pub fn offline_cpu(&self, cpu: CpuId) -> SchedResult<usize> {
        self.check_cpu(cpu)?;
        if !self.is_online(cpu) {
            return Err(SchedError::CpuOffline { cpu });
        }
        // offline first so placement stops targeting this queue
        self.online[cpu].store(false, Ordering::Relaxed);

        let mut tasks = self.tasks.lock();

        // every linked task must have somewhere to go before we touch
        // anything
        {
            let rq = self.queues[cpu].lock();
            for id in rq.iter(&tasks) {
                let affinity = tasks
                    .get(id)
                    .map(|t| t.affinity())
                    .ok_or(SchedError::UnknownTask { task: id })?;
                if self.select_cpu(&affinity, Some(cpu)).is_none() {
                    self.online[cpu].store(true, Ordering::Relaxed);
                    return Err(SchedError::NoCpuAllowed { task: id });
                }
            }
        }

        let mut src = self.queues[cpu].lock();
        if let Some(curr) = src.current() {
            self.policy.put_prev_task(&mut src, &mut tasks, curr);
            src.set_current(None);
        }

        let mut moved = 0;
        while let Some(id) = src.head() {
            let affinity = tasks
                .get(id)
                .map(|t| t.affinity())
                .ok_or(SchedError::UnknownTask { task: id })?;
            // verified above, so a target exists
            let Some(target) = self.select_cpu(&affinity, Some(cpu)) else {
                break;
            };
            let mut dst = self.queues[target].lock();
            self.policy.dequeue_task(&mut src, &mut tasks, id);
            self.policy.enqueue_task(&mut dst, &mut tasks, id);
            moved += 1;
        }
        self.metrics.record_migrations(moved as u64);
        log::debug!("cpu{} offline, drained {} tasks", cpu, moved);
        Ok(moved)
    }

    /// Verify structural invariants on every queue.
    pub fn verify(&self) -> SchedResult<()> {
        let tasks = self.tasks.lock();
        for queue in &self.queues {
            queue.lock().check_consistency(&tasks)?;
        }
        Ok(())
    }
}
