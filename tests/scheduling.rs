//! End-to-end scheduling scenarios through [`SchedDomain`].

use std::sync::Arc;
use std::thread;

use static_assertions::assert_impl_all;

use wrr_sched::{CpuMask, SchedDomain, SchedError, WrrParams};

assert_impl_all!(SchedDomain: Send, Sync);

const TICK_NS: u64 = 1_000;

/// Drive `ticks` timer interrupts on `cpu`, switching whenever the
/// class asks for it. Returns the final clock.
fn drive(dom: &SchedDomain, cpu: usize, start_ns: u64, ticks: u64) -> u64 {
    let mut now = start_ns;
    for _ in 0..ticks {
        now += TICK_NS;
        if dom.tick(cpu, now).unwrap() {
            dom.switch(cpu, now).unwrap();
        }
    }
    now
}

#[test]
fn runtime_split_is_proportional_to_weight() {
    let dom = SchedDomain::new(1, WrrParams::default()).unwrap();
    let light = dom.create_task(1, CpuMask::all()).unwrap(); // slice 1
    let heavy = dom.create_task(3, CpuMask::all()).unwrap(); // slice 3
    dom.enqueue(light).unwrap();
    dom.enqueue(heavy).unwrap();
    dom.switch(0, 0).unwrap();

    // one rotation cycle is 4 ticks: light runs 1, heavy runs 3
    drive(&dom, 0, 0, 8);

    dom.with_task(light, |t| assert_eq!(t.sum_runtime(), 2 * TICK_NS))
        .unwrap();
    dom.with_task(heavy, |t| assert_eq!(t.sum_runtime(), 6 * TICK_NS))
        .unwrap();
    dom.verify().unwrap();
}

#[test]
fn sole_task_never_relinquishes_cpu() {
    let dom = SchedDomain::new(1, WrrParams::new(2, 1, u32::MAX)).unwrap();
    let t = dom.create_task(1, CpuMask::all()).unwrap(); // slice 2
    dom.enqueue(t).unwrap();
    dom.switch(0, 0).unwrap();

    let mut now = 0;
    for _ in 0..20 {
        now += TICK_NS;
        assert!(!dom.tick(0, now).unwrap(), "sole task asked to reschedule");
        assert_eq!(dom.current(0).unwrap(), Some(t));
    }
    dom.with_task(t, |t| assert_eq!(t.sum_runtime(), 20 * TICK_NS))
        .unwrap();
}

#[test]
fn migrated_task_continues_on_target_cpu() {
    let dom = SchedDomain::new(2, WrrParams::default()).unwrap();
    for _ in 0..6 {
        let t = dom.create_task(1, CpuMask::all()).unwrap();
        dom.enqueue_on(t, 0).unwrap();
    }

    let moved = dom.rebalance();
    assert!(moved >= 1);
    assert_eq!(dom.queue_len(1).unwrap(), moved);

    // the stolen tasks schedule normally on their new CPU
    let picked = dom.switch(1, 0).unwrap().expect("cpu1 has work now");
    dom.with_task(picked, |t| assert_eq!(t.queued_on(), Some(1)))
        .unwrap();
    drive(&dom, 1, 0, 4);
    dom.with_task(picked, |t| assert!(t.sum_runtime() > 0)).unwrap();
    dom.verify().unwrap();
}

#[test]
fn offline_cpu_hands_work_to_survivors() {
    let dom = SchedDomain::new(3, WrrParams::default()).unwrap();
    let mut ids = Vec::new();
    for cpu in [0, 0, 1, 2] {
        let t = dom.create_task(2, CpuMask::all()).unwrap();
        dom.enqueue_on(t, cpu).unwrap();
        ids.push(t);
    }
    dom.switch(0, 0).unwrap();

    let drained = dom.offline_cpu(0).unwrap();
    assert_eq!(drained, 2);
    assert_eq!(dom.queue_len(0).unwrap(), 0);
    assert_eq!(dom.current(0).unwrap(), None);

    // every task is still queued somewhere online
    for &t in &ids {
        dom.with_task(t, |t| {
            let cpu = t.queued_on().expect("task lost during drain");
            assert_ne!(cpu, 0);
        })
        .unwrap();
    }

    // survivors keep scheduling; the dead CPU rejects placement
    drive(&dom, 1, 0, 10);
    let pinned = dom.create_task(1, CpuMask::single(0)).unwrap();
    assert_eq!(dom.enqueue(pinned), Err(SchedError::NoCpuAllowed { task: pinned }));

    dom.online_cpu(0).unwrap();
    assert_eq!(dom.enqueue(pinned), Ok(0));
    dom.verify().unwrap();
}

#[test]
fn per_cpu_ticks_run_concurrently() {
    let dom = Arc::new(SchedDomain::new(2, WrrParams::default()).unwrap());
    for cpu in 0..2 {
        for _ in 0..3 {
            let t = dom.create_task(1, CpuMask::single(cpu)).unwrap();
            dom.enqueue_on(t, cpu).unwrap();
        }
        dom.switch(cpu, 0).unwrap();
    }

    let handles: Vec<_> = (0..2)
        .map(|cpu| {
            let dom = Arc::clone(&dom);
            thread::spawn(move || {
                drive(&dom, cpu, 0, 200);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    dom.verify().unwrap();
    let snap = dom.metrics().snapshot();
    assert_eq!(snap.ticks, 400);
    // each CPU accounted exactly its own wall clock to its own tasks
    for cpu in 0..2 {
        assert_eq!(dom.queue_len(cpu).unwrap(), 3);
    }
}

#[test]
fn weight_change_reshapes_the_rotation() {
    let dom = SchedDomain::new(1, WrrParams::default()).unwrap();
    let a = dom.create_task(1, CpuMask::all()).unwrap();
    let b = dom.create_task(1, CpuMask::all()).unwrap();
    dom.enqueue(a).unwrap();
    dom.enqueue(b).unwrap();
    dom.switch(0, 0).unwrap();

    // equal weights: a fair 1:1 split over one full cycle
    drive(&dom, 0, 0, 2);
    dom.with_task(a, |t| assert_eq!(t.sum_runtime(), TICK_NS)).unwrap();
    dom.with_task(b, |t| assert_eq!(t.sum_runtime(), TICK_NS)).unwrap();

    // triple A's weight: from the next reset it runs 3 ticks per turn
    dom.set_weight(a, 3).unwrap();
    drive(&dom, 0, 2 * TICK_NS, 8);

    dom.with_task(a, |t| assert_eq!(t.sum_runtime(), 7 * TICK_NS)).unwrap();
    dom.with_task(b, |t| assert_eq!(t.sum_runtime(), 3 * TICK_NS)).unwrap();
}
