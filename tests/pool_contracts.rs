//! Contract tests for pool and registry invariants.
//!
//! Each test drives a deterministic scenario and then checks that the
//! invariants guarding that path were actually asserted.

use hwring::invariant_ppt::{
    contract_test, ALLOCATION_ROLLBACK, DESTROY_RELEASES_ALL, REGISTRY_RESERVATION_HELD,
    REGISTRY_SLOT_EXCLUSIVE, RELEASE_IN_ISSUE_ORDER, RING_CURSOR_BOUNDED, RING_REMAINING_BOUNDED,
    TEARDOWN_INVALIDATES_POOLS,
};
use hwring::sim::SimComponent;
use hwring::{BufferPool, BufferRequest, Error, ErrorReporter, PoolRegistry, PortIndex};
use std::sync::Arc;

#[test]
fn contract_ring_bookkeeping() {
    let sim = Arc::new(SimComponent::new("camera").with_port(PortIndex(71), 64, 2));
    let pool = BufferPool::create(sim, BufferRequest::new(PortIndex(71)), Arc::new(ErrorReporter::new()))
        .unwrap();
    let buffer = pool.acquire().unwrap().unwrap();
    pool.release(buffer).unwrap();
    pool.check_invariants();
    pool.destroy().unwrap();

    contract_test(
        "ring bookkeeping",
        &[
            RING_REMAINING_BOUNDED,
            RING_CURSOR_BOUNDED,
            RELEASE_IN_ISSUE_ORDER,
            DESTROY_RELEASES_ALL,
        ],
    );
}

#[test]
fn contract_allocation_rollback() {
    let sim = Arc::new(
        SimComponent::new("render")
            .with_port(PortIndex(90), 64, 3)
            .fail_allocation_at(2),
    );
    assert!(BufferPool::create(sim, BufferRequest::new(PortIndex(90)), Arc::new(ErrorReporter::new())).is_err());
    contract_test("allocation rollback", &[ALLOCATION_ROLLBACK]);
}

#[test]
fn contract_registry_accounting() {
    let registry = PoolRegistry::new(1, Arc::new(ErrorReporter::new()));
    let sim = Arc::new(SimComponent::new("render").with_port(PortIndex(90), 64, 1));
    registry.create(sim.clone(), BufferRequest::new(PortIndex(90))).unwrap();
    assert!(registry.create(sim, BufferRequest::new(PortIndex(90))).is_err());
    registry.destroy_all();

    contract_test(
        "registry accounting",
        &[
            REGISTRY_SLOT_EXCLUSIVE,
            REGISTRY_RESERVATION_HELD,
            TEARDOWN_INVALIDATES_POOLS,
        ],
    );
}

#[test]
fn contract_failed_releases_are_still_counted() {
    // Rollback where the component refuses every buffer back.
    let sim = Arc::new(
        SimComponent::new("render")
            .with_port(PortIndex(90), 64, 3)
            .fail_allocation_at(3),
    );
    sim.set_fail_release(true);
    let err = BufferPool::create(sim.clone(), BufferRequest::new(PortIndex(90)), Arc::new(ErrorReporter::new()))
        .unwrap_err();
    assert!(matches!(err, Error::Hardware { operation: "allocate_buffer", .. }));
    assert_eq!(sim.live_buffers(), 2);

    // Destroy where every release fails.
    let sim = Arc::new(SimComponent::new("camera").with_port(PortIndex(71), 64, 2));
    let pool = BufferPool::create(sim.clone(), BufferRequest::new(PortIndex(71)), Arc::new(ErrorReporter::new()))
        .unwrap();
    sim.set_fail_release(true);
    assert!(matches!(pool.destroy(), Err(Error::Hardware { .. })));
    assert!(!pool.is_valid());

    contract_test(
        "failed releases counted",
        &[ALLOCATION_ROLLBACK, DESTROY_RELEASES_ALL],
    );
}
