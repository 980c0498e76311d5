use hwring::sim::SimComponent;
use hwring::{BufferPool, BufferRequest, ErrorReporter, PortIndex};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

fn pool_of(capacity: usize) -> (Arc<SimComponent>, BufferPool) {
    let sim = Arc::new(SimComponent::new("render").with_port(PortIndex(90), 1024, capacity));
    let pool = BufferPool::create(
        sim.clone(),
        BufferRequest::new(PortIndex(90)),
        Arc::new(ErrorReporter::new()),
    )
    .unwrap();
    (sim, pool)
}

#[test]
fn capacity_four_walkthrough() {
    let (_sim, pool) = pool_of(4);

    let mut held: VecDeque<_> = (0..4).map(|_| pool.acquire().unwrap().unwrap()).collect();
    assert_eq!(held.iter().map(|b| b.slot()).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert!(pool.acquire().unwrap().is_none());
    assert_eq!(pool.remaining(), 0);

    pool.release(held.pop_front().unwrap()).unwrap();
    let again = pool.acquire().unwrap().unwrap();
    assert_eq!(again.slot(), 0);
    held.push_back(again);

    for _ in 0..3 {
        pool.release(held.pop_front().unwrap()).unwrap();
    }
    let next: Vec<_> = (0..3).map(|_| pool.acquire().unwrap().unwrap().slot()).collect();
    assert_eq!(next, vec![1, 2, 3]);
}

#[test]
fn exhausted_acquire_has_no_side_effects() {
    let (_sim, pool) = pool_of(2);
    let _a = pool.acquire().unwrap().unwrap();
    let _b = pool.acquire().unwrap().unwrap();
    let cursor = pool.cursor();
    for _ in 0..10 {
        assert!(pool.acquire().unwrap().is_none());
    }
    assert_eq!(pool.cursor(), cursor);
    assert_eq!(pool.remaining(), 0);
    assert_eq!(pool.outstanding(), 2);
}

#[test]
fn destroy_releases_what_create_allocated() {
    let (sim, pool) = pool_of(5);
    assert_eq!(sim.allocated(), 5);
    let _a = pool.acquire().unwrap().unwrap();
    let _b = pool.acquire().unwrap().unwrap();

    pool.destroy().unwrap();
    assert_eq!(sim.released(), 5);
    assert_eq!(sim.live_buffers(), 0);
    assert!(matches!(pool.acquire(), Err(hwring::Error::InvalidHandle(_))));
}

#[test]
fn release_after_destroy_hands_buffer_back() {
    let (_sim, pool) = pool_of(2);
    let a = pool.acquire().unwrap().unwrap();
    pool.destroy().unwrap();
    let err = pool.release(a).unwrap_err();
    assert!(matches!(err.error(), hwring::Error::InvalidHandle(_)));
    assert_eq!(err.into_buffer().slot(), 0);
}

proptest! {
    #[test]
    fn ring_accounting_matches_model(
        capacity in 1usize..9,
        ops in proptest::collection::vec(any::<bool>(), 0..64),
    ) {
        let (_sim, pool) = pool_of(capacity);
        let mut held = VecDeque::new();
        let mut expected_slot = 0usize;

        for acquire in ops {
            if acquire {
                match pool.acquire().unwrap() {
                    Some(buffer) => {
                        prop_assert!(held.len() < capacity);
                        prop_assert_eq!(buffer.slot(), expected_slot);
                        expected_slot = (expected_slot + 1) % capacity;
                        held.push_back(buffer);
                    }
                    None => prop_assert_eq!(held.len(), capacity),
                }
            } else if let Some(buffer) = held.pop_front() {
                pool.release(buffer).unwrap();
            }

            prop_assert_eq!(pool.remaining(), capacity - held.len());
            prop_assert_eq!(pool.cursor(), expected_slot);
            prop_assert_eq!(pool.peek_current().unwrap().slot, expected_slot);
        }
    }
}
